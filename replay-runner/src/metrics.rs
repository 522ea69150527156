//! Performance metrics — pure functions over the frozen execution stream
//! and snapshot log.
//!
//! Every metric reads shared immutable inputs and writes one report field;
//! the aggregate computation fans the independent metrics out over a rayon
//! scope and joins them into a single `Report`. All money math is exact
//! `Decimal`; the only `f64` escapes are the `powf` inside CAGR and the
//! risk-free conversion and standard deviation inside Sharpe and Sortino.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use replay_core::domain::PortfolioView;

use crate::trades::Trade;

/// Seconds in a Julian year (365.25 days); CAGR's year denominator.
const SECONDS_PER_YEAR: f64 = 31_557_600.0;

/// Aggregate performance report for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    // Meta / period info
    pub start_date: DateTime<Utc>,
    pub total_period: Duration,
    pub total_trades: usize,

    // Absolute performance
    pub net_profit: Decimal,
    pub net_avg_profit_per_trade: Decimal,
    pub cagr: Decimal,

    // Trade-level distribution
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub win_loss_ratio: Decimal,

    // Drawdown and loss streaks
    pub max_drawdown: Decimal,
    pub max_drawdown_percent: Decimal,
    pub max_drawdown_duration: Duration,
    pub max_consecutive_losses: usize,

    // Risk-adjusted
    pub sharpe_ratio: Decimal,
    pub sortino_ratio: Decimal,
    pub profit_factor: Decimal,

    // Costs
    pub total_fees: Decimal,
}

impl Report {
    /// Compute every metric over the frozen inputs.
    ///
    /// The metrics are independent pure functions; they run concurrently but
    /// the result is deterministic for identical inputs.
    pub fn compute(
        trades: &[Trade],
        snapshots: &[PortfolioView],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sharpe_annual_risk_free: Decimal,
    ) -> Report {
        let mut profit_and_fees = (Decimal::ZERO, Decimal::ZERO);
        let mut avg_profit = Decimal::ZERO;
        let mut win_loss = (Decimal::ZERO, Decimal::ZERO);
        let mut growth = Decimal::ZERO;
        let mut drawdown = (Decimal::ZERO, Decimal::ZERO, Duration::zero());
        let mut loss_streak = 0usize;
        let mut sharpe = Decimal::ZERO;
        let mut sortino = Decimal::ZERO;
        let mut ratio = Decimal::ZERO;
        let mut factor = Decimal::ZERO;

        rayon::scope(|s| {
            s.spawn(|_| profit_and_fees = net_profit_and_fees(trades));
            s.spawn(|_| avg_profit = net_avg_profit_per_trade(trades));
            s.spawn(|_| win_loss = avg_win_loss(trades));
            s.spawn(|_| growth = cagr(snapshots));
            s.spawn(|_| drawdown = drawdown_metrics(snapshots));
            s.spawn(|_| loss_streak = max_consecutive_losses(trades));
            s.spawn(|_| sharpe = sharpe_ratio(snapshots, sharpe_annual_risk_free));
            s.spawn(|_| sortino = sortino_ratio(snapshots, sharpe_annual_risk_free));
            s.spawn(|_| ratio = win_loss_ratio(trades));
            s.spawn(|_| factor = profit_factor(trades));
        });

        Report {
            start_date: start,
            total_period: Duration::days((end - start).num_days()),
            total_trades: trades.len(),
            net_profit: profit_and_fees.0,
            net_avg_profit_per_trade: avg_profit,
            cagr: growth,
            avg_win: win_loss.0,
            avg_loss: win_loss.1,
            win_loss_ratio: ratio,
            max_drawdown: drawdown.0,
            max_drawdown_percent: drawdown.1,
            max_drawdown_duration: drawdown.2,
            max_consecutive_losses: loss_streak,
            sharpe_ratio: sharpe,
            sortino_ratio: sortino,
            profit_factor: factor,
            total_fees: profit_and_fees.1,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = Decimal::ONE_HUNDRED;
        writeln!(f, "===== Trading Report =====")?;
        writeln!(f, "Start Date:             {}", self.start_date.format("%Y-%m-%d"))?;
        writeln!(f, "Total Period:           {} days", self.total_period.num_days())?;
        writeln!(f, "Total Trades:           {}", self.total_trades)?;
        writeln!(f)?;
        writeln!(f, "-- Absolute Performance --")?;
        writeln!(f, "Net Profit:             {:.2}", self.net_profit.round_dp(2))?;
        writeln!(f, "Avg Profit/Trade:       {:.2}", self.net_avg_profit_per_trade.round_dp(2))?;
        writeln!(f, "CAGR:                   {:.2}%", (self.cagr * pct).round_dp(2))?;
        writeln!(f)?;
        writeln!(f, "-- Trade-Level Metrics --")?;
        writeln!(f, "Avg Win:                {:.2}", self.avg_win.round_dp(2))?;
        writeln!(f, "Avg Loss:               {:.2}", self.avg_loss.round_dp(2))?;
        writeln!(f, "Win Loss Ratio:         {:.2}", self.win_loss_ratio.round_dp(2))?;
        writeln!(f)?;
        writeln!(f, "-- Drawdown Metrics --")?;
        writeln!(f, "Max Drawdown:           {:.2}", self.max_drawdown.round_dp(2))?;
        writeln!(f, "Max Drawdown %:         {:.2}%", (self.max_drawdown_percent * pct).round_dp(2))?;
        writeln!(f, "Max Drawdown Days:      {}", self.max_drawdown_duration.num_days())?;
        writeln!(f, "Max Consecutive Losses: {}", self.max_consecutive_losses)?;
        writeln!(f)?;
        writeln!(f, "-- Risk-Adjusted Metrics --")?;
        writeln!(f, "Sharpe Ratio:           {:.2}", self.sharpe_ratio.round_dp(2))?;
        writeln!(f, "Sortino Ratio:          {:.2}", self.sortino_ratio.round_dp(2))?;
        writeln!(f, "Profit Factor:          {:.2}", self.profit_factor.round_dp(2))?;
        writeln!(f)?;
        writeln!(f, "-- Costs --")?;
        writeln!(f, "Total Fees:             {:.2}", self.total_fees.round_dp(2))?;
        write!(f, "==========================")
    }
}

// ─── Trade-stream metrics ───────────────────────────────────────────

/// Realized gross profit minus all fees, and the fee total itself.
///
/// Gross PnL is realized only for trades with both legs filled; fees are
/// charged for every fill, open trades included.
pub fn net_profit_and_fees(trades: &[Trade]) -> (Decimal, Decimal) {
    let mut gross = Decimal::ZERO;
    let mut fees = Decimal::ZERO;

    for trade in trades {
        let b = trade.breakdown();
        if b.has_buy && b.has_sell {
            gross += b.gross;
        }
        fees += b.fees;
    }
    (gross - fees, fees)
}

/// Net profit spread over the realized trade count; zero when nothing
/// realized.
pub fn net_avg_profit_per_trade(trades: &[Trade]) -> Decimal {
    let mut gross = Decimal::ZERO;
    let mut fees = Decimal::ZERO;
    let mut realized = 0i64;

    for trade in trades {
        let b = trade.breakdown();
        if b.has_buy && b.has_sell {
            gross += b.gross;
            realized += 1;
        }
        fees += b.fees;
    }

    if realized == 0 {
        return Decimal::ZERO;
    }
    (gross - fees) / Decimal::from(realized)
}

/// Mean net win and absolute mean net loss over realized trades. Zero-net
/// trades land in neither bucket.
pub fn avg_win_loss(trades: &[Trade]) -> (Decimal, Decimal) {
    let mut wins = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    let mut win_count = 0i64;
    let mut loss_count = 0i64;

    for trade in trades {
        let Some(net) = trade.net_pnl() else {
            continue;
        };
        if net > Decimal::ZERO {
            wins += net;
            win_count += 1;
        } else if net < Decimal::ZERO {
            losses += net.abs();
            loss_count += 1;
        }
    }

    let avg_win = if win_count > 0 {
        wins / Decimal::from(win_count)
    } else {
        Decimal::ZERO
    };
    let avg_loss = if loss_count > 0 {
        losses / Decimal::from(loss_count)
    } else {
        Decimal::ZERO
    };
    (avg_win, avg_loss)
}

/// Wins over decided trades, judged on the matched quantity and average
/// fill prices. Breakeven and zero-quantity trades are excluded.
pub fn win_loss_ratio(trades: &[Trade]) -> Decimal {
    let mut wins = 0i64;
    let mut losses = 0i64;

    for trade in trades {
        let (Some(buy), Some(sell)) = (&trade.buy, &trade.sell) else {
            continue;
        };
        let qty = buy.total_filled_qty.min(sell.total_filled_qty);
        if qty.is_zero() {
            continue;
        }

        let gross = (sell.avg_fill_price - buy.avg_fill_price) * qty;
        let pnl = gross - (buy.total_fees + sell.total_fees);
        if pnl > Decimal::ZERO {
            wins += 1;
        } else if pnl < Decimal::ZERO {
            losses += 1;
        }
    }

    let total = wins + losses;
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(wins) / Decimal::from(total)
}

/// Longest run of losing realized trades, ordered by trade close time.
pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    let mut results: Vec<(DateTime<Utc>, Decimal)> = trades
        .iter()
        .filter_map(|trade| trade.net_pnl().map(|net| (trade.close_time(), net)))
        .collect();
    results.sort_by_key(|(close, _)| *close);

    let mut longest = 0;
    let mut current = 0;
    for (_, net) in results {
        if net < Decimal::ZERO {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Gross net wins over gross net losses across realized trades, capped at
/// 100 when losses vanish.
pub fn profit_factor(trades: &[Trade]) -> Decimal {
    let mut gross_wins = Decimal::ZERO;
    let mut gross_losses = Decimal::ZERO;

    for trade in trades {
        let Some(net) = trade.net_pnl() else {
            continue;
        };
        if net > Decimal::ZERO {
            gross_wins += net;
        } else if net < Decimal::ZERO {
            gross_losses += net.abs();
        }
    }

    let cap = Decimal::ONE_HUNDRED;
    if gross_losses.is_zero() {
        return if gross_wins > Decimal::ZERO {
            cap
        } else {
            Decimal::ZERO
        };
    }
    (gross_wins / gross_losses).min(cap)
}

// ─── Snapshot metrics ───────────────────────────────────────────────

/// Running-peak drawdown over snapshot equity: the deepest absolute fall,
/// its fraction of the peak, and the elapsed time since that peak.
pub fn drawdown_metrics(snapshots: &[PortfolioView]) -> (Decimal, Decimal, Duration) {
    let mut peak = Decimal::ZERO;
    let mut peak_time = DateTime::UNIX_EPOCH;

    let mut max_dd = Decimal::ZERO;
    let mut max_dd_pct = Decimal::ZERO;
    let mut max_dd_duration = Duration::zero();

    for (i, snapshot) in snapshots.iter().enumerate() {
        let equity = snapshot.total_value();

        if i == 0 || equity > peak || peak.is_zero() {
            peak = equity;
            peak_time = snapshot.time;
        }

        if peak > Decimal::ZERO {
            let dd = peak - equity;
            if dd > max_dd {
                max_dd = dd;
                max_dd_pct = dd / peak;
                max_dd_duration = snapshot.time - peak_time;
            }
        }
    }

    (max_dd, max_dd_pct, max_dd_duration)
}

/// Compound annual growth rate between the first and last snapshot.
///
/// `years` uses seconds over a Julian year; the exponentiation itself runs
/// in `f64`, the one deliberate departure from exact decimal math here.
pub fn cagr(snapshots: &[PortfolioView]) -> Decimal {
    if snapshots.len() < 2 {
        return Decimal::ZERO;
    }

    let first = &snapshots[0];
    let last = &snapshots[snapshots.len() - 1];

    let start_value = first.total_value();
    let end_value = last.total_value();
    if start_value <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let elapsed = last.time - first.time;
    if elapsed <= Duration::zero() {
        return Decimal::ZERO;
    }
    let years = elapsed.num_seconds() as f64 / SECONDS_PER_YEAR;
    if years <= 0.0 {
        return Decimal::ZERO;
    }

    let ratio = (end_value / start_value).to_f64().unwrap_or(0.0);
    if ratio <= 0.0 {
        return Decimal::ZERO;
    }

    Decimal::from_f64(ratio.powf(1.0 / years) - 1.0).unwrap_or(Decimal::ZERO)
}

/// Month-over-month returns between calendar-month-end equities.
///
/// The latest snapshot inside each month is that month's end value; a
/// non-positive month end is skipped as the base for the next return.
pub fn monthly_returns(snapshots: &[PortfolioView]) -> Vec<Decimal> {
    if snapshots.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&PortfolioView> = snapshots.iter().collect();
    ordered.sort_by_key(|view| view.time);

    // Sorted input: a plain insert keeps the latest snapshot per month, and
    // BTreeMap ordering walks the months chronologically.
    let mut month_ends: std::collections::BTreeMap<(i32, u32), Decimal> =
        std::collections::BTreeMap::new();
    for view in ordered {
        month_ends.insert((view.time.year(), view.time.month()), view.total_value());
    }

    let values: Vec<Decimal> = month_ends.into_values().collect();
    if values.len() < 2 {
        return Vec::new();
    }

    let mut returns = Vec::with_capacity(values.len() - 1);
    let mut prev = values[0];
    for value in values.into_iter().skip(1) {
        if prev <= Decimal::ZERO {
            prev = value;
            continue;
        }
        returns.push(value / prev - Decimal::ONE);
        prev = value;
    }
    returns
}

/// Annualized Sharpe ratio over monthly excess returns.
///
/// Monthly risk-free is `(1 + rf)^(1/12) - 1`; mean and sample standard
/// deviation run in `f64`, and the monthly ratio is annualized by sqrt(12).
/// Zero with fewer than two monthly returns or zero dispersion.
pub fn sharpe_ratio(snapshots: &[PortfolioView], annual_risk_free: Decimal) -> Decimal {
    let excess = monthly_excess_returns(snapshots, annual_risk_free);
    if excess.len() < 2 {
        return Decimal::ZERO;
    }

    let mean = mean_f64(&excess);
    let std = sample_std_dev(&excess, mean);
    if std == 0.0 {
        return Decimal::ZERO;
    }

    Decimal::from_f64(mean / std * 12.0_f64.sqrt()).unwrap_or(Decimal::ZERO)
}

/// Annualized Sortino ratio over monthly excess returns: like Sharpe but
/// the denominator is the downside deviation. Zero when there is no
/// downside month.
pub fn sortino_ratio(snapshots: &[PortfolioView], annual_risk_free: Decimal) -> Decimal {
    let excess = monthly_excess_returns(snapshots, annual_risk_free);
    if excess.len() < 2 {
        return Decimal::ZERO;
    }

    let mean = mean_f64(&excess);
    let downside_sq: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return Decimal::ZERO;
    }
    let downside_std = (downside_sq / excess.len() as f64).sqrt();
    if downside_std == 0.0 {
        return Decimal::ZERO;
    }

    Decimal::from_f64(mean / downside_std * 12.0_f64.sqrt()).unwrap_or(Decimal::ZERO)
}

fn monthly_excess_returns(snapshots: &[PortfolioView], annual_risk_free: Decimal) -> Vec<f64> {
    let returns = monthly_returns(snapshots);
    let rf_annual = annual_risk_free.to_f64().unwrap_or(0.0);
    let rf_monthly = (1.0 + rf_annual).powf(1.0 / 12.0) - 1.0;

    returns
        .iter()
        .map(|r| r.to_f64().unwrap_or(0.0) - rf_monthly)
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}
