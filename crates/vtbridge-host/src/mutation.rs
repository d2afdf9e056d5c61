use vtbridge_error::{Result, VtabError};
use vtbridge_types::Value;

/// A decoded `update` call.
///
/// The host encodes all three statements in one argument vector:
/// - `[key]`: DELETE the row at `key`;
/// - `[NULL, requested_key, values...]`: INSERT (`requested_key` may be
///   NULL);
/// - `[key, new_key, values...]`: UPDATE, changing the key when `new_key`
///   differs from `key`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation<'a> {
    Delete {
        key: &'a Value,
    },
    Insert {
        key: Option<&'a Value>,
        values: &'a [Value],
    },
    Update {
        key: &'a Value,
        new_key: Option<&'a Value>,
        values: &'a [Value],
    },
}

impl<'a> Mutation<'a> {
    pub fn from_host_argv(argv: &'a [Value]) -> Result<Self> {
        match argv {
            [] => Err(VtabError::misuse("update called with an empty argument vector")),
            [key] => Ok(Self::Delete { key }),
            [Value::Null, requested, values @ ..] => Ok(Self::Insert {
                key: (!requested.is_null()).then_some(requested),
                values,
            }),
            [key, new_key, values @ ..] => Ok(Self::Update {
                key,
                new_key: (new_key != key).then_some(new_key),
                values,
            }),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Delete { .. } => "delete",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_delete() {
        let argv = [Value::Integer(3)];
        assert_eq!(
            Mutation::from_host_argv(&argv).unwrap(),
            Mutation::Delete {
                key: &Value::Integer(3)
            }
        );
    }

    #[test]
    fn decodes_insert() {
        let argv = [Value::Null, Value::Null, Value::Integer(1), Value::Real(1.1)];
        let Mutation::Insert { key, values } = Mutation::from_host_argv(&argv).unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(key, None);
        assert_eq!(values, &[Value::Integer(1), Value::Real(1.1)]);

        let argv = [Value::Null, Value::Integer(9), Value::from("x")];
        let Mutation::Insert { key, .. } = Mutation::from_host_argv(&argv).unwrap() else {
            panic!("expected insert");
        };
        assert_eq!(key, Some(&Value::Integer(9)));
    }

    #[test]
    fn decodes_update_with_and_without_key_change() {
        let argv = [Value::Integer(3), Value::Integer(13), Value::Integer(13)];
        let mutation = Mutation::from_host_argv(&argv).unwrap();
        assert_eq!(mutation.kind(), "update");
        assert_eq!(
            mutation,
            Mutation::Update {
                key: &Value::Integer(3),
                new_key: Some(&Value::Integer(13)),
                values: &[Value::Integer(13)],
            }
        );

        let argv = [Value::Integer(3), Value::Integer(3), Value::from("hello")];
        let Mutation::Update { new_key, .. } = Mutation::from_host_argv(&argv).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(new_key, None);
    }

    #[test]
    fn empty_vector_is_misuse() {
        assert!(matches!(
            Mutation::from_host_argv(&[]),
            Err(VtabError::Misuse(_))
        ));
    }
}
