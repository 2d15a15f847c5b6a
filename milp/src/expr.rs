use std::fmt;

/// Handle of a variable inside a [`Model`](crate::Model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub(crate) usize);

impl Var {
    /// Returns the dense index of the variable in its model
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Linear expression `sum(coeff * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, coeff: f64, var: Var) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, constant: f64) -> &mut Self {
        self.constant += constant;
        self
    }

    /// Adds `coeff * other` to this expression
    pub fn add_expr(&mut self, coeff: f64, other: &LinExpr) -> &mut Self {
        self.terms
            .extend(other.terms.iter().map(|(var, c)| (*var, coeff * c)));
        self.constant += coeff * other.constant;
        self
    }

    pub fn terms(&self) -> impl Iterator<Item = (Var, f64)> + '_ {
        self.terms.iter().copied()
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Merges duplicate variables and drops zero coefficients; terms end up sorted by variable
    pub fn compact(mut self) -> Self {
        self.terms.sort_by_key(|(var, _)| *var);
        let mut merged: Vec<(Var, f64)> = Vec::with_capacity(self.terms.len());
        for (var, coeff) in self.terms {
            match merged.last_mut() {
                Some((last, sum)) if *last == var => *sum += coeff,
                _ => merged.push((var, coeff)),
            }
        }
        merged.retain(|(_, coeff)| *coeff != 0.0);
        self.terms = merged;
        self
    }

    /// Evaluates the expression for values indexed by variable
    ///
    /// Panics if a variable of the expression has no value; [`Model`](crate::Model) checks
    /// the assignment length before evaluating.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.0])
            .sum::<f64>()
            + self.constant
    }

    pub(crate) fn max_var(&self) -> Option<Var> {
        self.terms.iter().map(|(var, _)| *var).max()
    }
}

impl From<Var> for LinExpr {
    fn from(var: Var) -> Self {
        let mut expr = LinExpr::new();
        expr.add_term(1.0, var);
        expr
    }
}

impl From<f64> for LinExpr {
    fn from(constant: f64) -> Self {
        LinExpr {
            terms: Vec::new(),
            constant,
        }
    }
}

impl From<i32> for LinExpr {
    fn from(constant: i32) -> Self {
        f64::from(constant).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Ge => write!(f, ">="),
            Sense::Eq => write!(f, "=="),
        }
    }
}

/// Unnamed (in)equality `lhs sense rhs`, usually created with [`c!`](crate::c)
#[derive(Debug, Clone, PartialEq)]
pub struct IneqExpr {
    pub lhs: LinExpr,
    pub sense: Sense,
    pub rhs: LinExpr,
}

impl IneqExpr {
    pub fn new(lhs: impl Into<LinExpr>, sense: Sense, rhs: impl Into<LinExpr>) -> Self {
        Self {
            lhs: lhs.into(),
            sense,
            rhs: rhs.into(),
        }
    }
}

/// Builds an [`IneqExpr`] from `lhs <= rhs`, `lhs >= rhs` or `lhs == rhs`
#[macro_export]
macro_rules! c {
    ($lhs:tt <= $rhs:expr) => {
        $crate::IneqExpr::new($lhs, $crate::Sense::Le, $rhs)
    };
    ($lhs:tt >= $rhs:expr) => {
        $crate::IneqExpr::new($lhs, $crate::Sense::Ge, $rhs)
    };
    ($lhs:tt == $rhs:expr) => {
        $crate::IneqExpr::new($lhs, $crate::Sense::Eq, $rhs)
    };
}
