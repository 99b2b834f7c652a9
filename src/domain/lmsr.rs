//! Logarithmic Market Scoring Rule (LMSR) pricing functions.
//!
//! Pure functions over the share pools of a binary outcome market.
//! Reference: Hanson (2003) "Combinatorial Information Market Design".
//!
//! The liquidity parameter `b` controls market depth:
//! - Higher `b` = more liquidity, slower price movement
//! - Lower `b` = less liquidity, faster price movement
//!
//! All functions apply the max-shift `m = max(q_yes, q_no) / b` before
//! exponentiating. Without it `exp` overflows once a pool grows past a few
//! hundred times `b`; the shift keeps both exponents non-positive.

use super::order::Outcome;

/// LMSR cost function: `C(q) = b * (m + ln(exp(q_yes/b - m) + exp(q_no/b - m)))`.
pub fn cost(yes_shares: f64, no_shares: f64, liquidity_b: f64) -> f64 {
    let max_q = yes_shares.max(no_shares) / liquidity_b;
    let exp_yes = (yes_shares / liquidity_b - max_q).exp();
    let exp_no = (no_shares / liquidity_b - max_q).exp();
    liquidity_b * (exp_yes + exp_no).ln() + liquidity_b * max_q
}

/// Instantaneous YES price: `exp(q_yes/b - m) / (exp(q_yes/b - m) + exp(q_no/b - m))`.
///
/// Always strictly inside (0, 1) for positive `b`. The NO price is its
/// complement.
pub fn price(yes_shares: f64, no_shares: f64, liquidity_b: f64) -> f64 {
    let max_q = yes_shares.max(no_shares) / liquidity_b;
    let exp_yes = (yes_shares / liquidity_b - max_q).exp();
    let exp_no = (no_shares / liquidity_b - max_q).exp();
    exp_yes / (exp_yes + exp_no)
}

/// Cost of buying `delta_shares` of `outcome` at the given pool state:
/// `C(q') - C(q)` where `q'` adds the delta to the matching pool.
///
/// Non-negative for any legal state and `delta_shares >= 0`.
pub fn compute_cost(
    yes_shares: f64,
    no_shares: f64,
    outcome: Outcome,
    delta_shares: f64,
    liquidity_b: f64,
) -> f64 {
    let old_cost = cost(yes_shares, no_shares, liquidity_b);
    let new_cost = match outcome {
        Outcome::Yes => cost(yes_shares + delta_shares, no_shares, liquidity_b),
        Outcome::No => cost(yes_shares, no_shares + delta_shares, liquidity_b),
    };
    new_cost - old_cost
}
