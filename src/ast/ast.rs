use std::{
    collections::{HashMap, HashSet},
    ops::{Index, IndexMut},
};

use crate::Span;

use super::{
    expressions::{BinaryOperator, UnaryOperator},
    statements::{Branch, ClassDef, FunctionDef, StructDef},
    types::Type,
};

/// Handle of a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a variable's type and storage live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingSite {
    Global(String),
    /// A local of the scope-forming node `scope`.
    Local { scope: NodeId, name: String },
}

impl BindingSite {
    pub fn name(&self) -> &str {
        match self {
            BindingSite::Global(name) => name,
            BindingSite::Local { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntry {
    pub ty: Type,
    /// Source line of the declaring statement.
    pub line: u32,
}

/// Symbol table owned by a scope-forming node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub locals: HashMap<String, LocalEntry>,
    /// Declaration order of `locals`.
    pub local_order: Vec<String>,
    /// Nested function, class and struct definitions by name.
    pub definitions: HashMap<String, NodeId>,
    /// Names redirected to the global table by a `global` statement.
    pub globals: HashSet<String>,
}

impl Scope {
    pub fn insert_local(&mut self, name: &str, ty: Type, line: u32) {
        if !self.locals.contains_key(name) {
            self.local_order.push(name.to_string());
        }
        self.locals.insert(name.to_string(), LocalEntry { ty, line });
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.local_order.iter().position(|field| field == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Module { body: Vec<NodeId> },

    // Statements
    ExprStmt { expr: NodeId },
    Assign { target: NodeId, value: NodeId },
    If { branches: Vec<Branch>, else_body: Vec<NodeId> },
    While { condition: NodeId, body: Vec<NodeId> },
    /// `for variable in range(end)`
    For { variable: String, end: NodeId, body: Vec<NodeId> },
    Return { value: Option<NodeId> },
    Global { names: Vec<String> },
    Print { args: Vec<NodeId> },
    Pass,
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    StructDef(StructDef),

    // Expressions
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    StringLiteral(String),
    Variable { name: String },
    Binary { op: BinaryOperator, left: NodeId, right: NodeId },
    Unary { op: UnaryOperator, operand: NodeId },
    Call { callee: String, args: Vec<NodeId> },
    MethodCall { receiver: NodeId, method: String, args: Vec<NodeId> },
    Field { object: NodeId, field: String },
    Index { object: NodeId, index: NodeId },
    List { elements: Vec<NodeId> },
    Dict { entries: Vec<(NodeId, NodeId)> },
    StructLiteral { name: String, fields: Vec<(String, NodeId)> },
}

impl NodeKind {
    pub fn is_scope_forming(&self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDef(_) | NodeKind::ClassDef(_) | NodeKind::StructDef(_)
        )
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::IntLiteral(_)
                | NodeKind::FloatLiteral(_)
                | NodeKind::BoolLiteral(_)
                | NodeKind::StringLiteral(_)
                | NodeKind::Variable { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Call { .. }
                | NodeKind::MethodCall { .. }
                | NodeKind::Field { .. }
                | NodeKind::Index { .. }
                | NodeKind::List { .. }
                | NodeKind::Dict { .. }
                | NodeKind::StructLiteral { .. }
        )
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Module { body } => body.clone(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::Assign { target, value } => vec![*target, *value],
            NodeKind::If {
                branches,
                else_body,
            } => {
                let mut children = vec![];
                for branch in branches {
                    children.push(branch.condition);
                    children.extend(branch.body.iter().copied());
                }
                children.extend(else_body.iter().copied());
                children
            }
            NodeKind::While { condition, body } => {
                let mut children = vec![*condition];
                children.extend(body.iter().copied());
                children
            }
            NodeKind::For { end, body, .. } => {
                let mut children = vec![*end];
                children.extend(body.iter().copied());
                children
            }
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Print { args } => args.clone(),
            NodeKind::FunctionDef(def) => def.body.clone(),
            NodeKind::ClassDef(def) => def.body.clone(),
            NodeKind::StructDef(def) => def.fields.clone(),
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Call { args, .. } => args.clone(),
            NodeKind::MethodCall { receiver, args, .. } => {
                let mut children = vec![*receiver];
                children.extend(args.iter().copied());
                children
            }
            NodeKind::Field { object, .. } => vec![*object],
            NodeKind::Index { object, index } => vec![*object, *index],
            NodeKind::List { elements } => elements.clone(),
            NodeKind::Dict { entries } => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            NodeKind::StructLiteral { fields, .. } => fields.iter().map(|(_, v)| *v).collect(),
            NodeKind::Global { .. }
            | NodeKind::Pass
            | NodeKind::IntLiteral(_)
            | NodeKind::FloatLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::Variable { .. } => vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Non-owning back reference, filled by [`Ast::link_parents`].
    pub parent: Option<NodeId>,
    /// Assigned by the resolver.
    pub ty: Type,
    /// Variable reads, assignment targets and loop variables.
    pub binding: Option<BindingSite>,
    /// Set on the assignment or loop that first creates its binding.
    pub need_create: bool,
    /// Resolved signature key of a call, or the class a call constructs.
    pub target: Option<String>,
    /// Present exactly on scope-forming nodes.
    pub scope: Option<Scope>,
}

impl Node {
    pub fn line(&self) -> u32 {
        self.span.line()
    }
}

/// Arena holding every node of one program.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let scope = kind.is_scope_forming().then(Scope::default);

        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            ty: Type::Unresolved,
            binding: None,
            need_create: false,
            target: None,
            scope,
        });

        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The `Module` node, or the first node before `set_root` was called.
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Statements of the module body.
    pub fn module_body(&self) -> &[NodeId] {
        match &self[self.root()].kind {
            NodeKind::Module { body } => body,
            _ => &[],
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self[id].parent
    }

    /// Fills every node's `parent` from the tree shape below the root.
    pub fn link_parents(&mut self) {
        let mut stack = vec![self.root()];

        while let Some(id) = stack.pop() {
            for child in self[id].kind.children() {
                self[child].parent = Some(id);
                stack.push(child);
            }
        }
    }

    /// Removes `child` from whichever statement list of `parent` holds it.
    pub fn detach(&mut self, parent: NodeId, child: NodeId) {
        let retain = |body: &mut Vec<NodeId>| body.retain(|id| *id != child);

        match &mut self[parent].kind {
            NodeKind::Module { body } => retain(body),
            NodeKind::FunctionDef(def) => retain(&mut def.body),
            NodeKind::ClassDef(def) => retain(&mut def.body),
            NodeKind::While { body, .. } | NodeKind::For { body, .. } => retain(body),
            NodeKind::If {
                branches,
                else_body,
            } => {
                for branch in branches.iter_mut() {
                    retain(&mut branch.body);
                }
                retain(else_body);
            }
            _ => {}
        }

        self[child].parent = None;
    }

    /// Nearest scope-forming node at or above `id`.
    pub fn enclosing_scope(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self[node].scope.is_some() {
                return Some(node);
            }
            current = self[node].parent;
        }
        None
    }

    /// Nearest scope-forming node strictly above `id`.
    pub fn enclosing_scope_above(&self, id: NodeId) -> Option<NodeId> {
        self[id].parent.and_then(|parent| self.enclosing_scope(parent))
    }

    pub fn scope(&self, id: NodeId) -> Option<&Scope> {
        self[id].scope.as_ref()
    }

    pub fn scope_mut(&mut self, id: NodeId) -> Option<&mut Scope> {
        self[id].scope.as_mut()
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        &mut self.nodes[id.index()]
    }
}
