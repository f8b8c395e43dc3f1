//! Java type descriptors.
//!
//! Dalvik and the JVM share the same descriptor grammar (`I`, `[J`, `Ljava/lang/String;`),
//! so descriptors flow through the translator mostly as plain strings. This module
//! provides the structured view used where a descriptor has to be validated or split.

use crate::error::TranslateError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map};
use nom::multi::many0;
use nom::sequence::{delimited, terminated};
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed field or return type descriptor.
///
/// # Examples
///
/// ```
///  use jarify::types::TypeDescriptor;
///
///  let t = TypeDescriptor::from_desc("[Ljava/lang/String;").unwrap();
///  assert_eq!(t.to_desc(), "[Ljava/lang/String;");
///  assert!(!t.is_wide());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Array(Box<TypeDescriptor>),
    Object(String),
    Int,
    Bool,
    Byte,
    Char,
    Short,
    Long,
    Float,
    Double,
    Void,
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_desc())
    }
}

impl TypeDescriptor {
    pub fn from_desc(s: &str) -> Result<TypeDescriptor, TranslateError> {
        match all_consuming(parse_type_descriptor).parse(s) {
            Ok((_, t)) => Ok(t),
            Err(_) => fail!("Malformed type descriptor {}", s),
        }
    }

    pub fn to_desc(&self) -> String {
        match self {
            TypeDescriptor::Array(a) => "[".to_string() + &a.to_desc(),
            TypeDescriptor::Object(o) => format!("L{o};"),
            TypeDescriptor::Int => "I".to_string(),
            TypeDescriptor::Bool => "Z".to_string(),
            TypeDescriptor::Byte => "B".to_string(),
            TypeDescriptor::Char => "C".to_string(),
            TypeDescriptor::Short => "S".to_string(),
            TypeDescriptor::Long => "J".to_string(),
            TypeDescriptor::Float => "F".to_string(),
            TypeDescriptor::Double => "D".to_string(),
            TypeDescriptor::Void => "V".to_string(),
        }
    }

    /// Long and double occupy two registers and two local slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, TypeDescriptor::Long | TypeDescriptor::Double)
    }
}

/// Parameter and return descriptors of a method, e.g. `(I[J)V`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub args: Vec<TypeDescriptor>,
    pub result: TypeDescriptor,
}

impl MethodDescriptor {
    pub fn from_desc(s: &str) -> Result<MethodDescriptor, TranslateError> {
        match all_consuming(parse_method_descriptor).parse(s) {
            Ok((_, m)) => Ok(m),
            Err(_) => fail!("Malformed method descriptor {}", s),
        }
    }

    pub fn to_desc(&self) -> String {
        let mut s = String::from("(");
        for a in &self.args {
            s.push_str(&a.to_desc());
        }
        s.push(')');
        s.push_str(&self.result.to_desc());
        s
    }
}

pub(crate) fn parse_type_descriptor(input: &str) -> IResult<&str, TypeDescriptor> {
    // Array
    let b: IResult<&str, char> = char('[').parse(input);
    if let Ok((o, _)) = b {
        let (o, t) = parse_type_descriptor(o)?;
        return Ok((o, TypeDescriptor::Array(Box::new(t))));
    }

    // Object
    let object = map(
        delimited(char('L'), take_while1(|c: char| c != ';'), char(';')),
        |name: &str| TypeDescriptor::Object(name.to_string()),
    );

    alt((
        object,
        map(tag("Z"), |_| TypeDescriptor::Bool),
        map(tag("B"), |_| TypeDescriptor::Byte),
        map(tag("C"), |_| TypeDescriptor::Char),
        map(tag("S"), |_| TypeDescriptor::Short),
        map(tag("I"), |_| TypeDescriptor::Int),
        map(tag("J"), |_| TypeDescriptor::Long),
        map(tag("F"), |_| TypeDescriptor::Float),
        map(tag("D"), |_| TypeDescriptor::Double),
        map(tag("V"), |_| TypeDescriptor::Void),
    ))
    .parse(input)
}

pub(crate) fn parse_method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (o, args) = delimited(char('('), many0(parse_type_descriptor), char(')')).parse(input)?;
    let (o, result) = terminated(parse_type_descriptor, nom::combinator::eof).parse(o)?;
    Ok((o, MethodDescriptor { args, result }))
}
