//! Represents parsed strings with embedded variable references, e.g.
//! `c++ $in -o $out`, and the scope machinery for expanding them into plain
//! strings.  A reference to a variable no scope defines expands to "".

use crate::smallmap::SmallMap;
use std::borrow::Cow;
use std::collections::HashMap;

/// An environment providing a mapping of variable name to variable value.
/// A given EvalString may be expanded against a chain of environments,
/// innermost scope first.
pub trait Env {
    fn get_var(&self, var: &str) -> Option<Cow<str>>;
}

/// One token within an EvalString, either literal text or a variable
/// reference.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalPart<T: AsRef<str>> {
    Literal(T),
    VarRef(T),
}

/// A parsed but unexpanded variable-reference string, e.g. "cc $in -o $out".
/// Generic so the parser can produce EvalString<&str> borrowing the manifest
/// text, while rules store EvalString<String> for delayed per-edge expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalString<T: AsRef<str>>(Vec<EvalPart<T>>);

impl<T: AsRef<str>> EvalString<T> {
    pub fn new(parts: Vec<EvalPart<T>>) -> Self {
        EvalString(parts)
    }

    pub fn evaluate(&self, envs: &[&dyn Env]) -> String {
        let mut val = String::new();
        for part in &self.0 {
            match part {
                EvalPart::Literal(s) => val.push_str(s.as_ref()),
                EvalPart::VarRef(v) => {
                    for env in envs {
                        if let Some(v) = env.get_var(v.as_ref()) {
                            val.push_str(&v);
                            break;
                        }
                    }
                }
            }
        }
        val
    }
}

impl EvalString<&str> {
    pub fn into_owned(self) -> EvalString<String> {
        EvalString(
            self.0
                .into_iter()
                .map(|part| match part {
                    EvalPart::Literal(s) => EvalPart::Literal(s.to_owned()),
                    EvalPart::VarRef(s) => EvalPart::VarRef(s.to_owned()),
                })
                .collect(),
        )
    }
}

/// The file-level variable scope.  Bindings evaluate eagerly in file order,
/// so values are stored as plain strings.
#[derive(Debug, Default, Clone)]
pub struct Vars(HashMap<String, String>);

impl Vars {
    pub fn insert(&mut self, key: String, val: String) {
        self.0.insert(key, val);
    }
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }
}

impl Env for Vars {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        self.0.get(var).map(|val| Cow::Borrowed(val.as_str()))
    }
}

// Impl for the already-evaluated variables attached to a build.
impl Env for SmallMap<String, String> {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        self.get(var).map(|val| Cow::Borrowed(val.as_str()))
    }
}
