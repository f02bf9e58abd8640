// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Approval polling for the app-key handshake.
//
// After a key request is created the server answers each status poll with
// 202 (pending), 200 (approved) or 404 (denied).  Pending answers are polled
// again after a fixed interval until the policy's attempt or time budget
// runs out.

use std::time::Duration;

use octobridge_core::config::PollPolicy;
use tracing::{debug, info, warn};

/// What to do after one status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// The user approved; the body carries the key.
    Approved,
    /// Still pending; poll again after this delay.
    WaitFor(Duration),
    /// The user denied the request.
    Denied,
    /// Still pending but the attempt or time budget is spent.
    Exhausted,
    /// A status the protocol does not define.
    Unexpected(u16),
}

/// Decide the next step from the status of poll number `attempt` (1-based).
///
/// `elapsed` is the time since the first poll was sent.
pub fn next_step(status: u16, attempt: u32, elapsed: Duration, policy: &PollPolicy) -> PollStep {
    match status {
        200 => {
            info!(attempt, "key request approved");
            PollStep::Approved
        }
        404 => {
            info!(attempt, "key request denied");
            PollStep::Denied
        }
        202 => {
            if attempt >= policy.max_attempts {
                warn!(attempt, max = policy.max_attempts, "approval poll limit reached");
                return PollStep::Exhausted;
            }
            if let Some(deadline) = policy.deadline
                && elapsed.saturating_add(policy.interval) > deadline
            {
                warn!(
                    elapsed_ms = elapsed.as_millis(),
                    deadline_ms = deadline.as_millis(),
                    "approval deadline reached"
                );
                return PollStep::Exhausted;
            }
            debug!(attempt, "key request pending");
            PollStep::WaitFor(policy.interval)
        }
        other => {
            warn!(status = other, "unexpected status while polling");
            PollStep::Unexpected(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, deadline: Option<Duration>) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts,
            deadline,
        }
    }

    #[test]
    fn pending_waits_one_interval() {
        let step = next_step(202, 1, Duration::ZERO, &PollPolicy::default());
        assert_eq!(step, PollStep::WaitFor(Duration::from_secs(1)));
    }

    #[test]
    fn approval_and_denial() {
        let p = PollPolicy::default();
        assert_eq!(next_step(200, 7, Duration::ZERO, &p), PollStep::Approved);
        assert_eq!(next_step(404, 1, Duration::ZERO, &p), PollStep::Denied);
    }

    #[test]
    fn attempt_limit_is_respected() {
        let p = policy(3, None);
        assert!(matches!(next_step(202, 2, Duration::ZERO, &p), PollStep::WaitFor(_)));
        assert_eq!(next_step(202, 3, Duration::ZERO, &p), PollStep::Exhausted);
    }

    #[test]
    fn deadline_is_respected() {
        let p = policy(1000, Some(Duration::from_secs(10)));
        assert!(matches!(
            next_step(202, 5, Duration::from_secs(8), &p),
            PollStep::WaitFor(_)
        ));
        assert_eq!(
            next_step(202, 6, Duration::from_millis(9_500), &p),
            PollStep::Exhausted
        );
    }

    #[test]
    fn approval_wins_over_spent_budget() {
        let p = policy(1, Some(Duration::ZERO));
        assert_eq!(
            next_step(200, 50, Duration::from_secs(60), &p),
            PollStep::Approved
        );
    }

    #[test]
    fn other_statuses_end_the_loop() {
        let p = PollPolicy::default();
        assert_eq!(next_step(500, 1, Duration::ZERO, &p), PollStep::Unexpected(500));
        assert_eq!(next_step(201, 1, Duration::ZERO, &p), PollStep::Unexpected(201));
    }
}
