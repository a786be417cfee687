use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::secret::{self, Secret, REDACTED};

/// Variables the runner always provides; definitions may not redeclare them.
pub const BUILTIN_VARS: &[&str] = &[
    "WORKDIR",
    "BACKEND_URL",
    "BACKEND_TOKEN",
    "PRODUCT_NAME",
    "ENGAGEMENT_NAME",
    "TAGS",
];

/// Declaration of a pipeline variable in the `env:` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VarDecl {
    /// Process environment variable to read; defaults to the declared name.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone)]
enum Value {
    Plain(String),
    Secret(Secret),
}

impl Value {
    fn expose(&self) -> &str {
        match self {
            Value::Plain(s) => s,
            Value::Secret(s) => s.expose(),
        }
    }
}

/// Read-only variable set shared by every stage of a run.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, Value>,
}

/// A template with its placeholders substituted.
///
/// `redacted` is the same text with secret values masked and is the only
/// form that may be logged.
#[derive(Clone, PartialEq)]
pub struct Rendered {
    value: String,
    redacted: String,
}

impl fmt::Debug for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rendered").field(&self.redacted).finish()
    }
}

impl Rendered {
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Var(&'a str),
}

/// Split `template` into literal text and `${NAME}` references.
fn segments(template: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            out.push(Segment::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        out.push(Segment::Var(&after[..end]));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest));
    }
    Some(out)
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve declared variables against `lookup` (normally the process
    /// environment). Empty values count as unset.
    pub fn resolve<F>(decls: &BTreeMap<String, VarDecl>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Self::new();
        for (name, decl) in decls {
            if BUILTIN_VARS.contains(&name.as_str()) {
                return Err(ConfigError::ReservedVar(name.clone()));
            }
            let source = decl.from.as_deref().unwrap_or(name);
            let value = lookup(source)
                .filter(|v| !v.is_empty())
                .or_else(|| decl.default.clone())
                .ok_or_else(|| ConfigError::MissingVar {
                    name: name.clone(),
                    from: source.to_string(),
                })?;

            if decl.secret {
                if value.is_empty() {
                    return Err(ConfigError::Empty(format!("secret variable {name}")));
                }
                env.set_secret(name, Secret::new(value));
            } else {
                env.set(name, value);
            }
        }
        Ok(env)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), Value::Plain(value.into()));
    }

    pub fn set_secret(&mut self, name: &str, value: Secret) {
        self.vars.insert(name.to_string(), Value::Secret(value));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(Value::expose)
    }

    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        self.vars.values().filter_map(|v| match v {
            Value::Secret(s) => Some(s),
            Value::Plain(_) => None,
        })
    }

    /// Mask every secret value that appears in `text`.
    pub fn scrub(&self, text: &str) -> String {
        secret::scrub(text, self.secrets())
    }

    /// Verify that every placeholder in `template` names a known variable.
    pub fn check(&self, template: &str, location: &str) -> Result<(), ConfigError> {
        let segs = segments(template).ok_or_else(|| ConfigError::UnterminatedPlaceholder {
            location: location.to_string(),
        })?;
        for seg in segs {
            if let Segment::Var(name) = seg
                && !self.contains(name)
            {
                return Err(ConfigError::UndeclaredVar {
                    name: name.to_string(),
                    location: location.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn render(&self, template: &str) -> Result<Rendered, ConfigError> {
        let segs = segments(template).ok_or_else(|| ConfigError::UnterminatedPlaceholder {
            location: format!("'{template}'"),
        })?;

        let mut value = String::with_capacity(template.len());
        let mut redacted = String::with_capacity(template.len());
        for seg in segs {
            match seg {
                Segment::Literal(text) => {
                    value.push_str(text);
                    redacted.push_str(text);
                }
                Segment::Var(name) => match self.vars.get(name) {
                    Some(Value::Plain(v)) => {
                        value.push_str(v);
                        redacted.push_str(v);
                    }
                    Some(Value::Secret(s)) => {
                        value.push_str(s.expose());
                        redacted.push_str(REDACTED);
                    }
                    None => {
                        return Err(ConfigError::UndeclaredVar {
                            name: name.to_string(),
                            location: format!("'{template}'"),
                        });
                    }
                },
            }
        }
        Ok(Rendered { value, redacted })
    }
}
