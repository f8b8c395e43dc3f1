use std::fmt;
use std::rc::Rc;

use crate::error::TranslateError;
use crate::typeinference::scalars::Scalars;

/// Element type knowledge about a register holding an array.
///
/// `Invalid` is the top of the lattice (unknown or conflicting), `Null` the
/// bottom (only ever null). Only primitive array descriptors are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayType {
    Invalid,
    Null,
    Desc(Rc<str>),
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayType::Invalid => write!(f, "INVALID"),
            ArrayType::Null => write!(f, "NULL"),
            ArrayType::Desc(d) => write!(f, "{}", d),
        }
    }
}

impl ArrayType {
    pub fn from_desc(desc: &str) -> ArrayType {
        if !desc.starts_with('[') || desc.ends_with(';') {
            return ArrayType::Invalid;
        }
        ArrayType::Desc(Rc::from(desc))
    }

    /// Join at control flow merges; null absorbs.
    pub fn merge(a: &ArrayType, b: &ArrayType) -> ArrayType {
        match (a, b) {
            (ArrayType::Null, _) => b.clone(),
            (_, ArrayType::Null) => a.clone(),
            _ if a == b => a.clone(),
            _ => ArrayType::Invalid,
        }
    }

    /// Meet when a cast adds knowledge; unknown yields to known.
    pub fn narrow(a: &ArrayType, b: &ArrayType) -> ArrayType {
        match (a, b) {
            (ArrayType::Invalid, _) => b.clone(),
            (_, ArrayType::Invalid) => a.clone(),
            _ if a == b => a.clone(),
            _ => ArrayType::Null,
        }
    }

    /// Static type and descriptor of the array's elements.
    /// Callers handle `Null` themselves, since loads from a null array just throw.
    pub fn elet_pair(&self) -> Result<(Scalars, ArrayType), TranslateError> {
        match self {
            ArrayType::Null => fail!("Element type requested for a null array"),
            ArrayType::Invalid => Ok((Scalars::OBJ, ArrayType::Invalid)),
            ArrayType::Desc(d) => match d.strip_prefix('[') {
                Some(rest) => Ok((Scalars::from_desc(rest), ArrayType::Desc(Rc::from(rest)))),
                None => fail!("Not an array descriptor: {}", d),
            },
        }
    }

    pub fn desc(&self) -> Option<&str> {
        match self {
            ArrayType::Desc(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array() -> ArrayType {
        ArrayType::from_desc("[I")
    }

    #[test]
    fn from_desc_tracks_primitive_arrays_only() {
        assert_eq!(int_array(), ArrayType::Desc(Rc::from("[I")));
        assert_eq!(ArrayType::from_desc("[[J"), ArrayType::Desc(Rc::from("[[J")));
        assert_eq!(ArrayType::from_desc("[Ljava/lang/String;"), ArrayType::Invalid);
        assert_eq!(ArrayType::from_desc("I"), ArrayType::Invalid);
    }

    #[test]
    fn null_absorbs_on_merge() {
        assert_eq!(ArrayType::merge(&ArrayType::Null, &int_array()), int_array());
        assert_eq!(ArrayType::merge(&int_array(), &ArrayType::Null), int_array());
        assert_eq!(ArrayType::merge(&int_array(), &ArrayType::from_desc("[B")), ArrayType::Invalid);
        assert_eq!(ArrayType::merge(&ArrayType::Invalid, &ArrayType::Null), ArrayType::Invalid);
    }

    #[test]
    fn narrow_prefers_known() {
        assert_eq!(ArrayType::narrow(&ArrayType::Invalid, &int_array()), int_array());
        assert_eq!(ArrayType::narrow(&int_array(), &ArrayType::from_desc("[B")), ArrayType::Null);
    }

    #[test]
    fn element_pairs() {
        assert_eq!(int_array().elet_pair().unwrap(), (Scalars::INT, ArrayType::Desc(Rc::from("I"))));
        let (st, elet) = ArrayType::from_desc("[[J").elet_pair().unwrap();
        assert_eq!(st, Scalars::OBJ);
        assert_eq!(elet.desc(), Some("[J"));
        assert_eq!(ArrayType::Invalid.elet_pair().unwrap(), (Scalars::OBJ, ArrayType::Invalid));
        assert!(ArrayType::Null.elet_pair().is_err());
    }
}
