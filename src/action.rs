// Action Resolver - derive the correct next attendance action from history
// Total function: every input maps to exactly one action, it never fails.

use anyhow::Result;

use crate::ledger::{Action, Ledger};

/// Next step of the attendance cycle given the last recorded action.
/// No history means the day starts with an entry.
pub fn next_action(last: Option<Action>) -> Action {
    match last {
        None => Action::Entry,
        Some(Action::Entry) => Action::Break,
        Some(Action::Break) => Action::Exit,
        Some(Action::Exit) => Action::Entry,
    }
}

/// Resolve the next action for an identity from the ledger's read path.
/// Only the ledger lookup can fail; the policy itself is total.
pub fn next_action_for(ledger: &Ledger, identity_id: &str) -> Result<Action> {
    let last = ledger.last_event_for(identity_id)?;
    Ok(next_action(last.map(|e| e.action)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::ledger::{AttendanceEvent, Method};
    use crate::store::{Identity, Role};
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_no_history_yields_entry() {
        assert_eq!(next_action(None), Action::Entry);
    }

    #[test]
    fn test_cycle_entry_break_exit_entry() {
        assert_eq!(next_action(Some(Action::Entry)), Action::Break);
        assert_eq!(next_action(Some(Action::Break)), Action::Exit);
        assert_eq!(next_action(Some(Action::Exit)), Action::Entry);
    }

    #[test]
    fn test_repeated_resolution_strictly_cycles() {
        // Simulate a full day of resolutions against a growing history
        let mut last = None;
        let mut seen = Vec::new();
        for _ in 0..6 {
            let next = next_action(last);
            seen.push(next);
            last = Some(next);
        }

        assert_eq!(
            seen,
            vec![
                Action::Entry,
                Action::Break,
                Action::Exit,
                Action::Entry,
                Action::Break,
                Action::Exit,
            ]
        );
    }

    #[test]
    fn test_next_action_for_reads_ledger_history() {
        let ledger = Ledger::new(Database::open_in_memory().unwrap());
        let ana = Identity::new("11.111.111-1", "Ana Soto", Role::Docente);

        assert_eq!(next_action_for(&ledger, &ana.id).unwrap(), Action::Entry);

        ledger
            .append(&AttendanceEvent::at(
                &ana,
                Action::Entry,
                Method::Fingerprint,
                NaiveDate::parse_from_str("2025-03-10", "%Y-%m-%d").unwrap(),
                NaiveTime::parse_from_str("08:00:00", "%H:%M:%S").unwrap(),
            ))
            .unwrap();

        assert_eq!(next_action_for(&ledger, &ana.id).unwrap(), Action::Break);
    }
}
