//! The type lattice assigned by the resolver.
//!
//! Every expression node ends up carrying one of these. `Unresolved` is the
//! initial state of a node and is never allowed to reach lowering as a
//! top-level tag; it may only survive nested inside the element slot of an
//! empty container literal whose contents were never observed.

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Type {
    Int,
    Float,
    Bool,
    Text,
    /// Homogeneous list of the element type.
    List(Box<Type>),
    /// Text-keyed dictionary of the value type.
    Dict(Box<Type>),
    /// Value built from a struct literal.
    Struct(String),
    /// Value built by calling a class.
    Instance(String),
    /// A name bound to a function, keyed the same way as the signature table.
    Function(String),
    /// A name bound to a class.
    Class(String),
    Void,
    #[default]
    Unresolved,
}

impl Type {
    pub fn list_of(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn dict_of(value: Type) -> Type {
        Type::Dict(Box::new(value))
    }

    /// Values of these types live in reference counted runtime blocks.
    pub fn is_heap(&self) -> bool {
        matches!(
            self,
            Type::Text | Type::List(_) | Type::Dict(_) | Type::Struct(_) | Type::Instance(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// False only for a top-level `Unresolved` tag.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Type::Unresolved)
    }

    /// True when no `Unresolved` appears anywhere inside the type.
    pub fn is_fully_resolved(&self) -> bool {
        match self {
            Type::Unresolved => false,
            Type::List(element) | Type::Dict(element) => element.is_fully_resolved(),
            _ => true,
        }
    }

    /// Whether this type may be stored, passed or returned as a value.
    pub fn is_value(&self) -> bool {
        !matches!(
            self,
            Type::Void | Type::Function(_) | Type::Class(_) | Type::Unresolved
        )
    }

    /// Merges two container shapes, filling `Unresolved` element slots from
    /// the other side. No numeric widening happens here.
    pub fn unify(&self, other: &Type) -> Option<Type> {
        match (self, other) {
            (Type::Unresolved, other) => Some(other.clone()),
            (this, Type::Unresolved) => Some(this.clone()),
            (Type::List(a), Type::List(b)) => Some(Type::list_of(a.unify(b)?)),
            (Type::Dict(a), Type::Dict(b)) => Some(Type::dict_of(a.unify(b)?)),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// Value flow into a slot of type `self`: parameters, fields, container
    /// elements and returns. An Int value may widen into a Float slot.
    pub fn accepts(&self, value: &Type) -> bool {
        if *self == Type::Float && *value == Type::Int {
            return true;
        }

        self.unify(value).is_some() && value.is_value()
    }

    /// Reassignment of a variable already bound to `self`. Returns the type
    /// the binding holds afterwards.
    ///
    /// An Int binding may be widened by a Float reassignment; a Float binding
    /// never accepts an Int.
    pub fn widen_binding(&self, new: &Type) -> Option<Type> {
        match (self, new) {
            (Type::Int, Type::Float) => Some(Type::Float),
            (existing, new) if new.is_value() => existing.unify(new),
            _ => None,
        }
    }

    /// The element type of a list, the value type of a dict.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::List(element) | Type::Dict(element) => Some(element),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Bool => write!(f, "Bool"),
            Type::Text => write!(f, "Text"),
            Type::List(element) => write!(f, "List[{}]", element),
            Type::Dict(value) => write!(f, "Dict[Text, {}]", value),
            Type::Struct(name) => write!(f, "{}", name),
            Type::Instance(name) => write!(f, "{} instance", name),
            Type::Function(key) => write!(f, "function {}", key),
            Type::Class(name) => write!(f, "class {}", name),
            Type::Void => write!(f, "Void"),
            Type::Unresolved => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Type;

    #[test]
    fn test_int_widens_into_float_slot_only() {
        assert!(Type::Float.accepts(&Type::Int));
        assert!(!Type::Int.accepts(&Type::Float));
        assert!(Type::Text.accepts(&Type::Text));
        assert!(!Type::Text.accepts(&Type::Int));
    }

    #[test]
    fn test_binding_widening_is_one_directional() {
        assert_eq!(Type::Int.widen_binding(&Type::Float), Some(Type::Float));
        assert_eq!(Type::Float.widen_binding(&Type::Int), None);
        assert_eq!(Type::Bool.widen_binding(&Type::Bool), Some(Type::Bool));
    }

    #[test]
    fn test_unify_fills_empty_containers() {
        let empty = Type::list_of(Type::Unresolved);
        let ints = Type::list_of(Type::Int);
        assert_eq!(empty.unify(&ints), Some(ints.clone()));
        assert_eq!(ints.unify(&Type::list_of(Type::Float)), None);
        assert!(!empty.is_fully_resolved());
        assert!(empty.is_resolved());
    }

    #[test]
    fn test_containers_do_not_widen() {
        assert!(!Type::list_of(Type::Float).accepts(&Type::list_of(Type::Int)));
    }

    #[test]
    fn test_non_values_are_rejected() {
        assert!(!Type::Int.accepts(&Type::Void));
        assert_eq!(Type::Int.widen_binding(&Type::Function(String::from("f"))), None);
    }
}
