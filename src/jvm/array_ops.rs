//! Array element opcodes keyed by element descriptor.

use crate::jvm::ops::*;

/// `newarray` type code for a one dimensional primitive array descriptor.
pub fn new_array_code(desc: &str) -> Option<u8>
{
    let code = match desc
    {
        "[Z" => 4,
        "[C" => 5,
        "[F" => 6,
        "[D" => 7,
        "[B" => 8,
        "[S" => 9,
        "[I" => 10,
        "[J" => 11,
        _ => return None,
    };
    Some(code)
}

fn element_offset(elet: &str) -> Option<u8>
{
    let offset = match elet
    {
        "I" => 0,
        "J" => 1,
        "F" => 2,
        "D" => 3,
        "B" | "Z" => 5,
        "C" => 6,
        "S" => 7,
        _ => return None,
    };
    Some(offset)
}

/// Primitive array store for an element descriptor; `None` for references.
pub fn store_op(elet: &str) -> Option<u8>
{
    element_offset(elet).map(|o| IASTORE + o)
}

pub fn load_op(elet: &str) -> Option<u8>
{
    element_offset(elet).map(|o| IALOAD + o)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn element_opcodes()
    {
        assert_eq!(store_op("Z"), Some(BASTORE));
        assert_eq!(store_op("S"), Some(SASTORE));
        assert_eq!(load_op("D"), Some(DALOAD));
        assert_eq!(load_op("Ljava/lang/String;"), None);
        assert_eq!(new_array_code("[J"), Some(11));
        assert_eq!(new_array_code("[[J"), None);
    }
}
