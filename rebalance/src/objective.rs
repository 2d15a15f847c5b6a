use crate::error::MissingVariable;
use crate::problem::Instance;
use crate::variables::Variables;
use milp::LinExpr;

/// Builds the minimization objective
///
/// Clipped bikes and deviations from the ideal state are penalized, demand served after the
/// horizon is rewarded and time spent past the horizon is charged against that reward.
pub fn objective(instance: &Instance, vars: &Variables) -> Result<LinExpr, MissingVariable> {
    let weights = instance.weights();
    let mut expr = LinExpr::new();

    for i in instance.swap_stations() {
        expr.add_term(weights.violation, vars.clipped(i)?);
        expr.add_term(-weights.violation, vars.clipped_late(i)?);
        expr.add_term(weights.violation, vars.clipped_final(i)?);
        expr.add_term(weights.deviation, vars.deviation(i)?);
        expr.add_term(-weights.reward * weights.deviation_reward, vars.served(i)?);
    }
    for v in instance.all_vehicles() {
        expr.add_term(weights.reward * weights.driving_times, vars.finish_slack(v)?);
    }

    Ok(expr)
}
