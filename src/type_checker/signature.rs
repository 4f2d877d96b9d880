//! Call-driven function signatures.
//!
//! A signature starts `Pending` when its definition is visited. The first
//! call that reaches it fixes the parameter types from the call's arguments
//! and asks the resolver to walk the body once; every later call is only
//! validated against the fixed record.

use crate::{ast::ast::NodeId, ast::types::Type, errors::errors::ErrorImpl};

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureState {
    Pending,
    Fixed { params: Vec<Type>, ret: Type },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Parameters were just fixed; the caller must walk the body.
    NeedsInference,
    /// The call matches the fixed signature and yields this type.
    Validated(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub node: NodeId,
    pub params: Vec<String>,
    pub state: SignatureState,
    pub call_count: usize,
}

impl FunctionSignature {
    pub fn new(node: NodeId, params: Vec<String>) -> Self {
        FunctionSignature {
            node,
            params,
            state: SignatureState::Pending,
            call_count: 0,
        }
    }

    /// The single state transition entry point, run once per call site.
    pub fn resolve_or_validate(&mut self, args: &[Type]) -> Result<Resolution, ErrorImpl> {
        if args.len() > self.params.len() {
            return Err(ErrorImpl::UnexpectedArguments {
                expected: self.params.len(),
                received: args.len(),
            });
        } else if args.len() < self.params.len() {
            return Err(ErrorImpl::MissingArguments {
                expected: self.params.len(),
                received: args.len(),
            });
        }

        let resolution = match &self.state {
            SignatureState::Pending => {
                if let Some(arg) = args.iter().find(|arg| !arg.is_value()) {
                    return Err(ErrorImpl::ArgumentTypeMatchError {
                        expected: String::from("a value"),
                        received: arg.to_string(),
                    });
                }

                self.state = SignatureState::Fixed {
                    params: args.to_vec(),
                    ret: Type::Void,
                };
                Resolution::NeedsInference
            }
            SignatureState::Fixed { params, ret } => {
                for (param, arg) in params.iter().zip(args) {
                    if !param.accepts(arg) {
                        return Err(ErrorImpl::ArgumentTypeMatchError {
                            expected: param.to_string(),
                            received: arg.to_string(),
                        });
                    }
                }
                Resolution::Validated(ret.clone())
            }
        };

        self.call_count += 1;
        Ok(resolution)
    }

    /// Records the type of a `return` seen during the body walk. The last one wins.
    pub fn set_return(&mut self, ty: Type) {
        if let SignatureState::Fixed { ret, .. } = &mut self.state {
            *ret = ty;
        }
    }

    pub fn return_type(&self) -> Option<&Type> {
        match &self.state {
            SignatureState::Fixed { ret, .. } => Some(ret),
            SignatureState::Pending => None,
        }
    }

    pub fn param_types(&self) -> Option<&[Type]> {
        match &self.state {
            SignatureState::Fixed { params, .. } => Some(params),
            SignatureState::Pending => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.state, SignatureState::Fixed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{FunctionSignature, Resolution};
    use crate::{
        ast::{ast::NodeId, types::Type},
        errors::errors::ErrorImpl,
    };

    fn signature(params: &[&str]) -> FunctionSignature {
        FunctionSignature::new(
            NodeId::new(0),
            params.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn test_first_call_fixes_parameters() {
        let mut sig = signature(&["n"]);

        assert_eq!(
            sig.resolve_or_validate(&[Type::Int]),
            Ok(Resolution::NeedsInference)
        );
        assert_eq!(sig.param_types(), Some(&[Type::Int][..]));
        assert_eq!(sig.return_type(), Some(&Type::Void));
        assert_eq!(sig.call_count, 1);
    }

    #[test]
    fn test_later_calls_validate_only() {
        let mut sig = signature(&["n"]);
        sig.resolve_or_validate(&[Type::Int]).unwrap();
        sig.set_return(Type::Int);

        assert_eq!(
            sig.resolve_or_validate(&[Type::Int]),
            Ok(Resolution::Validated(Type::Int))
        );
        assert!(matches!(
            sig.resolve_or_validate(&[Type::Float]),
            Err(ErrorImpl::ArgumentTypeMatchError { .. })
        ));
        assert_eq!(sig.call_count, 2);
    }

    #[test]
    fn test_int_argument_widens_into_float_parameter() {
        let mut sig = signature(&["x"]);
        sig.resolve_or_validate(&[Type::Float]).unwrap();

        assert!(sig.resolve_or_validate(&[Type::Int]).is_ok());
    }

    #[test]
    fn test_arity_is_checked_before_fixing() {
        let mut sig = signature(&["a", "b"]);

        assert_eq!(
            sig.resolve_or_validate(&[Type::Int]),
            Err(ErrorImpl::MissingArguments {
                expected: 2,
                received: 1
            })
        );
        assert!(!sig.is_fixed());
        assert_eq!(sig.call_count, 0);
    }
}
