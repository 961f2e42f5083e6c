use vigil_common::types::{Agent, AlertLevel};

/// Quota thresholds, checked most-severe first so a single sample that
/// jumps past several marks reports them in escalation-sensible order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficThreshold {
    Pct100,
    Pct90,
    Pct80,
}

impl TrafficThreshold {
    pub fn percent(self) -> u32 {
        match self {
            TrafficThreshold::Pct100 => 100,
            TrafficThreshold::Pct90 => 90,
            TrafficThreshold::Pct80 => 80,
        }
    }

    pub fn level(self) -> AlertLevel {
        match self {
            TrafficThreshold::Pct100 => AlertLevel::Critical,
            TrafficThreshold::Pct90 => AlertLevel::Warning,
            TrafficThreshold::Pct80 => AlertLevel::Info,
        }
    }
}

/// Folds a monotonic receive-counter sample into the agent's traffic block.
///
/// Returns `false` when the agent has no quota accounting configured
/// (neither a limit nor a reset day) and nothing was touched.
///
/// An accounting period with no start timestamp is unseeded: its first
/// sample only establishes the baseline. (The baseline value itself cannot
/// mark seededness; a freshly booted agent legitimately reports counter 0.)
/// Afterwards each sample adds its delta over the previous counter reading
/// to `traffic_used`. A counter value below the recorded baseline means the
/// agent restarted: the baseline is re-seeded at the new counter and the
/// accumulated usage is kept.
pub fn apply_sample(agent: &mut Agent, current_recv: u64, now_ms: i64) -> bool {
    if agent.traffic_limit == 0 && agent.traffic_reset_day == 0 {
        return false;
    }

    if agent.traffic_period_start == 0 {
        agent.traffic_baseline_recv = current_recv;
        agent.traffic_used = 0;
        agent.traffic_period_start = now_ms;
        return true;
    }

    if current_recv < agent.traffic_baseline_recv {
        agent.traffic_baseline_recv = current_recv;
    } else {
        agent.traffic_used += current_recv - agent.traffic_baseline_recv;
        agent.traffic_baseline_recv = current_recv;
    }
    true
}

/// Reports quota thresholds newly crossed by the agent's current usage and
/// latches their sent flags so each fires once per accounting period.
pub fn crossed_thresholds(agent: &mut Agent) -> Vec<TrafficThreshold> {
    if agent.traffic_limit == 0 {
        return Vec::new();
    }

    let pct = usage_percent(agent);
    let mut crossed = Vec::new();

    if pct >= 100.0 && !agent.traffic_alert_sent_100 {
        agent.traffic_alert_sent_100 = true;
        crossed.push(TrafficThreshold::Pct100);
    }
    if pct >= 90.0 && !agent.traffic_alert_sent_90 {
        agent.traffic_alert_sent_90 = true;
        crossed.push(TrafficThreshold::Pct90);
    }
    if pct >= 80.0 && !agent.traffic_alert_sent_80 {
        agent.traffic_alert_sent_80 = true;
        crossed.push(TrafficThreshold::Pct80);
    }

    crossed
}

/// Current usage as a percentage of the quota (0 when unlimited).
pub fn usage_percent(agent: &Agent) -> f64 {
    if agent.traffic_limit == 0 {
        return 0.0;
    }
    agent.traffic_used as f64 / agent.traffic_limit as f64 * 100.0
}

/// Starts a fresh accounting period: usage and sent flags are cleared and
/// the period is marked unseeded, so the next sample re-establishes the
/// baseline and stamps the new period start.
pub fn reset_period(agent: &mut Agent) {
    agent.traffic_baseline_recv = 0;
    agent.traffic_used = 0;
    agent.traffic_period_start = 0;
    agent.traffic_alert_sent_80 = false;
    agent.traffic_alert_sent_90 = false;
    agent.traffic_alert_sent_100 = false;
}
