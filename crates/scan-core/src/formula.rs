//! Named formulas for pseudo devices.
//!
//! A formula is either a Rust closure with a declared arity or an `evalexpr`
//! expression whose variables are named after its inputs. Formulas are bound
//! to a concrete list of input names at registration time; binding is where
//! arity and unknown-variable mistakes surface, as configuration errors.
//!
//! ```rust,ignore
//! let sum = Formula::expression("sum", "c1 + c2")?;
//! let bound = sum.bind(&["c1".into(), "c2".into()])?;
//! assert_eq!(bound.eval(&[1.0, 3.0])?, 4.0);
//! ```

use crate::error::{ScanError, ScanResult};
use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value};
use std::sync::Arc;

type FormulaFn = Arc<dyn Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync>;

#[derive(Clone)]
enum Body {
    Closure { arity: usize, func: FormulaFn },
    Expression { source: String, tree: Node },
}

/// An unbound formula.
#[derive(Clone)]
pub struct Formula {
    name: String,
    body: Body,
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.body {
            Body::Closure { arity, .. } => f
                .debug_struct("Formula")
                .field("name", &self.name)
                .field("arity", arity)
                .finish(),
            Body::Expression { source, .. } => f
                .debug_struct("Formula")
                .field("name", &self.name)
                .field("expression", source)
                .finish(),
        }
    }
}

impl Formula {
    /// Closure formula taking exactly `arity` inputs.
    pub fn from_fn<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Closure {
                arity,
                func: Arc::new(move |args: &[f64]| Ok(func(args))),
            },
        }
    }

    /// Fallible closure formula taking exactly `arity` inputs.
    pub fn try_from_fn<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Closure {
                arity,
                func: Arc::new(func),
            },
        }
    }

    /// Expression formula, parsed immediately.
    pub fn expression(name: impl Into<String>, source: &str) -> ScanResult<Self> {
        let name = name.into();
        let tree = evalexpr::build_operator_tree(source)
            .map_err(|e| ScanError::Formula(format!("'{name}': cannot parse '{source}': {e}")))?;
        Ok(Self {
            name,
            body: Body::Expression {
                source: source.to_string(),
                tree,
            },
        })
    }

    /// Formula name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arity for closures; `None` for expressions, whose arity is
    /// the length of the input list they are bound to.
    pub fn arity(&self) -> Option<usize> {
        match &self.body {
            Body::Closure { arity, .. } => Some(*arity),
            Body::Expression { .. } => None,
        }
    }

    /// Bind to named inputs.
    ///
    /// Fails with [`ScanError::Configuration`] when a closure's arity differs
    /// from `inputs.len()` or an expression references a variable that is not
    /// one of `inputs`.
    pub fn bind(&self, inputs: &[String]) -> ScanResult<BoundFormula> {
        match &self.body {
            Body::Closure { arity, .. } if *arity != inputs.len() => {
                Err(ScanError::Configuration(format!(
                    "formula '{}' declares {} inputs but is bound to {} ({})",
                    self.name,
                    arity,
                    inputs.len(),
                    inputs.join(", ")
                )))
            }
            Body::Expression { tree, .. } => {
                if let Some(unknown) = tree
                    .iter_variable_identifiers()
                    .find(|var| !inputs.iter().any(|input| input.as_str() == *var))
                {
                    return Err(ScanError::Configuration(format!(
                        "formula '{}' references unknown variable '{}' (inputs: {})",
                        self.name,
                        unknown,
                        inputs.join(", ")
                    )));
                }
                Ok(BoundFormula {
                    formula: self.clone(),
                    inputs: inputs.to_vec(),
                })
            }
            Body::Closure { .. } => Ok(BoundFormula {
                formula: self.clone(),
                inputs: inputs.to_vec(),
            }),
        }
    }
}

/// A formula bound to an ordered list of input names.
#[derive(Debug, Clone)]
pub struct BoundFormula {
    formula: Formula,
    inputs: Vec<String>,
}

impl BoundFormula {
    /// Formula name.
    pub fn name(&self) -> &str {
        &self.formula.name
    }

    /// Input names in binding order.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Evaluate with one value per input, in binding order.
    pub fn eval(&self, values: &[f64]) -> ScanResult<f64> {
        if values.len() != self.inputs.len() {
            return Err(ScanError::Formula(format!(
                "'{}' expects {} values, got {}",
                self.formula.name,
                self.inputs.len(),
                values.len()
            )));
        }
        match &self.formula.body {
            Body::Closure { func, .. } => func(values)
                .map_err(|e| ScanError::Formula(format!("'{}': {e}", self.formula.name))),
            Body::Expression { tree, .. } => {
                let mut context = HashMapContext::new();
                for (name, value) in self.inputs.iter().zip(values) {
                    context
                        .set_value(name.clone(), Value::Float(*value))
                        .map_err(|e| ScanError::Formula(format!("'{}': {e}", self.formula.name)))?;
                }
                tree.eval_number_with_context(&context)
                    .map_err(|e| ScanError::Formula(format!("'{}': {e}", self.formula.name)))
            }
        }
    }
}
