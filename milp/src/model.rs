use crate::expr::{IneqExpr, LinExpr, Sense, Var};
use crate::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Continuous,
    Integer,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSense {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
    pub name: String,
    pub vtype: VarType,
    pub lb: f64,
    pub ub: f64,
}

/// Named constraint in normalized form `lhs sense rhs` (the constant of `lhs` is folded into `rhs`)
#[derive(Debug, Clone, PartialEq)]
pub struct Constr {
    name: String,
    lhs: LinExpr,
    sense: Sense,
    rhs: f64,
}

impl Constr {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lhs(&self) -> &LinExpr {
        &self.lhs
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Returns by how much the constraint is violated (0 if satisfied)
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs.evaluate(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

impl fmt::Display for Constr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.name)?;
        for (k, (var, coeff)) in self.lhs.terms().enumerate() {
            if k > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{coeff} {var}")?;
        }
        write!(f, " {} {}", self.sense, self.rhs)
    }
}

/// Something in an assignment that the model does not accept
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Bound { var: Var, value: f64 },
    Integrality { var: Var, value: f64 },
    Constraint { index: usize, amount: f64 },
}

/// In-memory record of a mixed-integer linear program
///
/// The model only collects variables, constraints and the objective; solving it is up to a
/// [`Backend`](crate::Backend).
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    vars: Vec<VarInfo>,
    constrs: Vec<Constr>,
    objective: LinExpr,
    sense: ModelSense,
    start: Vec<Option<f64>>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Model {
            name: name.to_string(),
            vars: Vec::new(),
            constrs: Vec::new(),
            objective: LinExpr::new(),
            sense: ModelSense::Minimize,
            start: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a new variable; binary variables are clamped to `[0, 1]`
    pub fn add_var(&mut self, name: &str, vtype: VarType, lb: f64, ub: f64) -> Result<Var> {
        let (lb, ub) = match vtype {
            VarType::Binary => (lb.max(0.0), ub.min(1.0)),
            _ => (lb, ub),
        };
        if lb.is_nan() || ub.is_nan() || lb > ub || lb == f64::INFINITY {
            return Err(Error::InvalidBounds {
                name: name.to_string(),
                lb,
                ub,
            });
        }

        let var = Var(self.vars.len());
        self.vars.push(VarInfo {
            name: name.to_string(),
            vtype,
            lb,
            ub,
        });
        self.start.push(None);
        Ok(var)
    }

    pub fn add_constr(&mut self, name: &str, ineq: IneqExpr) -> Result<usize> {
        let IneqExpr { lhs, sense, rhs } = ineq;
        let mut lhs = lhs;
        lhs.add_expr(-1.0, &rhs);
        let rhs = -lhs.constant();
        let mut lhs = lhs.compact();
        lhs.add_constant(-lhs.constant());

        self.check_expr(name, &lhs)?;
        if !rhs.is_finite() {
            return Err(Error::NonFinite(name.to_string()));
        }

        self.constrs.push(Constr {
            name: name.to_string(),
            lhs,
            sense,
            rhs,
        });
        Ok(self.constrs.len() - 1)
    }

    pub fn set_objective(&mut self, expr: LinExpr, sense: ModelSense) -> Result<()> {
        let expr = expr.compact();
        self.check_expr("objective", &expr)?;
        self.objective = expr;
        self.sense = sense;
        Ok(())
    }

    /// Sets a start value handed to the backend as a MIP start
    pub fn set_start(&mut self, var: Var, value: f64) -> Result<()> {
        match self.start.get_mut(var.0) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(Error::UnknownVar(var)),
        }
    }

    /// Sets start values for all variables at once, indexed like [`Model::vars`]
    pub fn set_starts(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.vars.len() {
            return Err(Error::AssignmentLength {
                got: values.len(),
                expected: self.vars.len(),
            });
        }
        self.start = values.iter().copied().map(Some).collect();
        Ok(())
    }

    fn check_expr(&self, name: &str, expr: &LinExpr) -> Result<()> {
        if let Some(var) = expr.max_var() {
            if var.0 >= self.vars.len() {
                return Err(Error::UnknownVar(var));
            }
        }
        if expr.terms().any(|(_, coeff)| !coeff.is_finite()) {
            return Err(Error::NonFinite(name.to_string()));
        }
        Ok(())
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constrs(&self) -> usize {
        self.constrs.len()
    }

    pub fn vars(&self) -> &[VarInfo] {
        &self.vars
    }

    pub fn var(&self, var: Var) -> Option<&VarInfo> {
        self.vars.get(var.0)
    }

    pub fn var_name(&self, var: Var) -> Option<&str> {
        self.var(var).map(|info| info.name.as_str())
    }

    pub fn constraints(&self) -> &[Constr] {
        &self.constrs
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn sense(&self) -> ModelSense {
        self.sense
    }

    pub fn start(&self, var: Var) -> Option<f64> {
        self.start.get(var.0).copied().flatten()
    }

    fn check_length(&self, values: &[f64]) -> Result<()> {
        if values.len() != self.vars.len() {
            return Err(Error::AssignmentLength {
                got: values.len(),
                expected: self.vars.len(),
            });
        }
        Ok(())
    }

    pub fn objective_value(&self, values: &[f64]) -> Result<f64> {
        self.check_length(values)?;
        Ok(self.objective.evaluate(values))
    }

    /// Lists every bound, integrality and constraint violation larger than `tol`
    pub fn check(&self, values: &[f64], tol: f64) -> Result<Vec<Violation>> {
        self.check_length(values)?;

        let mut violations = Vec::new();
        for (index, (info, value)) in self.vars.iter().zip(values.iter()).enumerate() {
            let var = Var(index);
            if *value < info.lb - tol || *value > info.ub + tol {
                violations.push(Violation::Bound { var, value: *value });
            }
            if info.vtype != VarType::Continuous && (value - value.round()).abs() > tol {
                violations.push(Violation::Integrality { var, value: *value });
            }
        }
        for (index, constr) in self.constrs.iter().enumerate() {
            let amount = constr.violation(values);
            if amount > tol {
                violations.push(Violation::Constraint { index, amount });
            }
        }
        Ok(violations)
    }

    /// Returns the constraints violated by more than `tol`
    pub fn violated_constraints(&self, values: &[f64], tol: f64) -> Result<Vec<&Constr>> {
        self.check_length(values)?;
        Ok(self
            .constrs
            .iter()
            .filter(|constr| constr.violation(values) > tol)
            .collect())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = |vtype: VarType| self.vars.iter().filter(|v| v.vtype == vtype).count();
        write!(
            f,
            "Model {:?} with {} variables ({} binary, {} integer, {} continuous) and {} constraints",
            self.name,
            self.vars.len(),
            count(VarType::Binary),
            count(VarType::Integer),
            count(VarType::Continuous),
            self.constrs.len()
        )
    }
}
