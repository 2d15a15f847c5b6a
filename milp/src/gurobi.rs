use crate::expr::Sense;
use crate::model::{Model, ModelSense, VarType};
use crate::solve::{Backend, Interrupt, Limits, Outcome, Solution, Status};
use crate::Result;
use tracing::{debug, info};

/// Solves recorded models with Gurobi
pub struct GurobiBackend {
    env: grb::Env,
}

impl GurobiBackend {
    pub fn new() -> grb::Result<Self> {
        let env = grb::Env::new("")?;
        Ok(GurobiBackend { env })
    }

    fn build(&self, model: &Model, limits: &Limits) -> grb::Result<(grb::Model, Vec<grb::Var>)> {
        let mut lp = grb::Model::with_env(model.name(), &self.env)?;

        if let Some(threads) = limits.threads {
            lp.set_param(grb::param::Threads, threads)?;
        }
        if let Some(time_limit) = limits.time_limit {
            lp.set_param(grb::param::TimeLimit, time_limit.as_secs_f64())?;
        }
        if let Some(gap) = limits.mip_gap {
            lp.set_param(grb::param::MIPGap, gap)?;
        }

        let vars = model
            .vars()
            .iter()
            .map(|info| {
                let vtype = match info.vtype {
                    VarType::Continuous => grb::VarType::Continuous,
                    VarType::Integer => grb::VarType::Integer,
                    VarType::Binary => grb::VarType::Binary,
                };
                lp.add_var(
                    &info.name,
                    vtype,
                    0.0,
                    info.lb,
                    info.ub,
                    std::iter::empty(),
                )
            })
            .collect::<grb::Result<Vec<_>>>()?;

        for constr in model.constraints() {
            let mut lhs = grb::expr::LinExpr::new();
            for (var, coeff) in constr.lhs().terms() {
                lhs.add_term(coeff, vars[var.index()]);
            }
            let rhs = constr.rhs();
            let ineq = match constr.sense() {
                Sense::Le => grb::c!(lhs <= rhs),
                Sense::Ge => grb::c!(lhs >= rhs),
                Sense::Eq => grb::c!(lhs == rhs),
            };
            lp.add_constr(constr.name(), ineq)?;
        }

        let mut objective = grb::expr::LinExpr::new();
        for (var, coeff) in model.objective().terms() {
            objective.add_term(coeff, vars[var.index()]);
        }
        objective.add_constant(model.objective().constant());
        let sense = match model.sense() {
            ModelSense::Minimize => grb::ModelSense::Minimize,
            ModelSense::Maximize => grb::ModelSense::Maximize,
        };
        lp.set_objective(objective, sense)?;

        lp.update()?;
        for (index, var) in vars.iter().enumerate() {
            if let Some(value) = model.start(crate::Var(index)) {
                lp.set_obj_attr(grb::attr::Start, var, value)?;
            }
        }

        Ok((lp, vars))
    }
}

struct InterruptCallback {
    interrupt: Interrupt,
}

impl grb::callback::Callback for InterruptCallback {
    fn callback(&mut self, w: grb::callback::Where) -> grb::callback::CbResult {
        if self.interrupt.is_raised() {
            match w {
                grb::callback::Where::Polling(ctx) => ctx.terminate(),
                grb::callback::Where::MIP(ctx) => ctx.terminate(),
                grb::callback::Where::MIPNode(ctx) => ctx.terminate(),
                _ => (),
            }
        }

        Ok(())
    }
}

impl Backend for GurobiBackend {
    fn name(&self) -> &str {
        "gurobi"
    }

    fn solve(&self, model: &Model, limits: &Limits, interrupt: &Interrupt) -> Result<Outcome> {
        let (mut lp, vars) = self.build(model, limits)?;

        let mut callback = InterruptCallback {
            interrupt: interrupt.clone(),
        };
        lp.optimize_with_callback(&mut callback)?;

        let grb_status = lp.status()?;
        let solution_count = lp.get_attr(grb::attr::SolCount)?;
        debug!(?grb_status, solution_count, "gurobi finished");

        let status = match grb_status {
            grb::Status::Optimal => Status::Optimal,
            grb::Status::Infeasible => Status::Infeasible,
            grb::Status::Unbounded => Status::Unbounded,
            grb::Status::InfOrUnbd => Status::InfeasibleOrUnbounded,
            _ if solution_count > 0 => Status::Suboptimal,
            grb::Status::TimeLimit => Status::TimeLimit,
            grb::Status::Interrupted => Status::Interrupted,
            other => Status::Other(format!("{other:?}")),
        };

        let solution = if status.has_solution() {
            let values = lp.get_obj_attr_batch(grb::attr::X, vars)?;
            let objective = lp.get_attr(grb::attr::ObjVal)?;
            info!(objective, %status, "gurobi solution");
            Some(Solution::new(values, objective))
        } else {
            None
        };

        Ok(Outcome { status, solution })
    }
}
