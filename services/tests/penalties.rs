mod helpers;

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::helpers::{base_time, minutes, setup};
    use services::AttendanceError;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|id| id.to_string()).collect()
    }

    /// Test Case: Absentees are penalized, attendees untouched, re-runs change nothing
    #[tokio::test]
    async fn test_reconciliation_scenario() {
        let env = setup().await;
        env.profile("A", 0, 1).await;
        env.profile("B", 20, 1).await;
        env.profile("C", 3, 1).await;
        let start = base_time();
        let (token, id) = env
            .session("Weekly sync", start, start + minutes(60), 10, 5, &["A", "B", "C"])
            .await;

        env.check_ins
            .check_in(&token, "A", start + minutes(10))
            .await
            .unwrap();
        assert_eq!(env.reload_profile("A").await.exp, 10);

        let report = env
            .penalties
            .apply_penalties(id, start + minutes(61))
            .await
            .unwrap();
        assert_eq!(report.session_id, id);
        assert_eq!(report.penalized, vec!["B".to_string(), "C".to_string()]);
        assert!(report.skipped.is_empty());
        assert_eq!(report.exp_lost.get("B"), Some(&5));
        assert_eq!(report.exp_lost.get("C"), Some(&3));
        assert!(!report.deactivated);

        assert_eq!(env.reload_profile("A").await.exp, 10);
        assert_eq!(env.reload_profile("B").await.exp, 15);
        let c = env.reload_profile("C").await;
        assert_eq!(c.exp, 0);
        assert_eq!(c.total_penalties, 1);
        assert_eq!(c.last_penalty, Some(start + minutes(61)));

        let detail = env.sessions.find_session(id).await.unwrap();
        assert_eq!(detail.attendees, ids(&["A"]));
        assert_eq!(detail.penalized_users, ids(&["B", "C"]));

        let again = env
            .penalties
            .apply_penalties(id, start + minutes(90))
            .await
            .unwrap();
        assert!(again.penalized.is_empty());
        assert_eq!(env.reload_profile("B").await.exp, 15);
        assert_eq!(env.reload_profile("B").await.total_penalties, 1);
        assert_eq!(env.penalties.penalty_history("B", None).await.unwrap().len(), 1);
    }

    /// Test Case: Reconciling a running session is refused
    #[tokio::test]
    async fn test_penalties_while_session_active() {
        let env = setup().await;
        env.profile("u1", 50, 1).await;
        let start = base_time();
        let end = start + minutes(60);
        let (_, id) = env.session("Running", start, end, 10, 5, &["u1"]).await;

        let result = env.penalties.apply_penalties(id, end - minutes(1)).await;

        match result {
            Err(AttendanceError::SessionStillActive { session_id, ends_at }) => {
                assert_eq!(session_id, id);
                assert_eq!(ends_at, end);
            }
            other => panic!("expected SessionStillActive, got {other:?}"),
        }
        assert_eq!(env.reload_profile("u1").await.exp, 50);
    }

    /// Test Case: Reconciliation at the exact end instant proceeds
    #[tokio::test]
    async fn test_penalties_at_end_instant() {
        let env = setup().await;
        env.profile("u1", 50, 1).await;
        let start = base_time();
        let end = start + minutes(60);
        let (_, id) = env.session("Edge", start, end, 10, 5, &["u1"]).await;

        let report = env.penalties.apply_penalties(id, end).await.unwrap();
        assert_eq!(report.penalized, vec!["u1".to_string()]);
    }

    /// Test Case: Unknown session
    #[tokio::test]
    async fn test_penalties_unknown_session() {
        let env = setup().await;

        let result = env.penalties.apply_penalties(999, base_time()).await;

        assert!(matches!(result, Err(AttendanceError::NotFound { entity: "Session", .. })));
    }

    /// Test Case: A penalty can drop the level but never below 1
    #[tokio::test]
    async fn test_penalty_lowers_level() {
        let env = setup().await;
        env.profile("u1", 150, 2).await;
        env.profile("u2", 10, 1).await;
        let start = base_time();
        let (_, id) = env
            .session("Harsh", start, start + minutes(30), 10, 60, &["u1", "u2"])
            .await;

        let report = env
            .penalties
            .apply_penalties(id, start + minutes(31))
            .await
            .unwrap();

        let u1 = env.reload_profile("u1").await;
        assert_eq!(u1.exp, 90);
        assert_eq!(u1.level, 1);
        let u2 = env.reload_profile("u2").await;
        assert_eq!(u2.exp, 0);
        assert_eq!(u2.level, 1);
        assert_eq!(report.exp_lost.get("u2"), Some(&10));
    }

    /// Test Case: Expected users without a profile are skipped, not recorded
    #[tokio::test]
    async fn test_missing_profiles_are_skipped() {
        let env = setup().await;
        env.profile("u1", 20, 1).await;
        let start = base_time();
        let (_, id) = env
            .session("Partial", start, start + minutes(30), 10, 5, &["ghost", "u1"])
            .await;

        let report = env
            .penalties
            .apply_penalties(id, start + minutes(45))
            .await
            .unwrap();

        assert_eq!(report.penalized, vec!["u1".to_string()]);
        assert_eq!(report.skipped, vec!["ghost".to_string()]);
        let detail = env.sessions.find_session(id).await.unwrap();
        assert_eq!(detail.penalized_users, ids(&["u1"]));

        // The ghost stays a candidate and is reported again on the next run.
        let again = env
            .penalties
            .apply_penalties(id, start + minutes(50))
            .await
            .unwrap();
        assert!(again.penalized.is_empty());
        assert_eq!(again.skipped, vec!["ghost".to_string()]);
    }

    /// Test Case: Concurrent reconciliations penalize each user once
    #[tokio::test]
    async fn test_concurrent_reconciliation() {
        let env = setup().await;
        env.profile("u1", 30, 1).await;
        env.profile("u2", 30, 1).await;
        let start = base_time();
        let (_, id) = env
            .session("Race", start, start + minutes(30), 10, 5, &["u1", "u2"])
            .await;
        let at = start + minutes(40);

        let (first, second) = tokio::join!(
            env.penalties.apply_penalties(id, at),
            env.penalties.apply_penalties(id, at),
        );

        let total = first.unwrap().penalized.len() + second.unwrap().penalized.len();
        assert_eq!(total, 2);
        assert_eq!(env.reload_profile("u1").await.exp, 25);
        assert_eq!(env.reload_profile("u2").await.exp, 25);
    }

    /// Test Case: Sweep reconciles and closes ended sessions only
    #[tokio::test]
    async fn test_sweep_ended_sessions() {
        let env = setup().await;
        env.profile("u1", 20, 1).await;
        env.profile("u2", 20, 1).await;
        let start = base_time();
        let (_, ended) = env
            .session("Morning", start, start + minutes(30), 10, 5, &["u1"])
            .await;
        let (_, running) = env
            .session("All day", start, start + minutes(600), 10, 5, &["u2"])
            .await;
        let now = start + minutes(60);

        let sweep = env.penalties.sweep_ended_sessions(now).await.unwrap();

        assert!(sweep.failures.is_empty());
        assert_eq!(sweep.reports.len(), 1);
        assert_eq!(sweep.reports[0].session_id, ended);
        assert!(sweep.reports[0].deactivated);
        assert_eq!(sweep.penalized_total(), 1);

        assert!(!env.sessions.find_session(ended).await.unwrap().session.is_active);
        assert!(env.sessions.find_session(running).await.unwrap().session.is_active);
        assert_eq!(env.reload_profile("u1").await.exp, 15);
        assert_eq!(env.reload_profile("u2").await.exp, 20);

        let repeat = env.penalties.sweep_ended_sessions(now).await.unwrap();
        assert!(repeat.reports.is_empty());
        assert_eq!(env.reload_profile("u1").await.exp, 15);
    }

    /// Test Case: A manual run before the sweep leaves the sweep nothing to penalize
    #[tokio::test]
    async fn test_sweep_after_manual_reconciliation() {
        let env = setup().await;
        env.profile("u1", 20, 1).await;
        let start = base_time();
        let (_, id) = env
            .session("Manual", start, start + minutes(30), 10, 5, &["u1"])
            .await;
        let now = start + minutes(45);

        env.penalties.apply_penalties(id, now).await.unwrap();
        let sweep = env.penalties.sweep_ended_sessions(now).await.unwrap();

        assert_eq!(sweep.reports.len(), 1);
        assert!(sweep.reports[0].penalized.is_empty());
        assert!(sweep.reports[0].deactivated);
        assert_eq!(env.reload_profile("u1").await.exp, 15);
        assert_eq!(env.reload_profile("u1").await.total_penalties, 1);
    }

    /// Test Case: Deactivated sessions can still be reconciled manually
    #[tokio::test]
    async fn test_manual_reconciliation_of_inactive_session() {
        let env = setup().await;
        env.profile("u1", 20, 1).await;
        let start = base_time();
        let (_, id) = env
            .session("Cancelled", start, start + minutes(30), 10, 5, &["u1"])
            .await;
        env.sessions.deactivate_session(id).await.unwrap();

        let sweep = env
            .penalties
            .sweep_ended_sessions(start + minutes(45))
            .await
            .unwrap();
        assert!(sweep.reports.is_empty());

        let report = env
            .penalties
            .apply_penalties(id, start + minutes(45))
            .await
            .unwrap();
        assert_eq!(report.penalized, vec!["u1".to_string()]);
    }

    /// Test Case: Penalty history is newest first and honours the limit
    #[tokio::test]
    async fn test_penalty_history() {
        let env = setup().await;
        env.profile("u1", 100, 2).await;
        let start = base_time();
        let mut ids = Vec::new();
        for i in 0..3 {
            let s = start + minutes(i * 60);
            let (_, id) = env
                .session(&format!("Session {i}"), s, s + minutes(30), 10, 5, &["u1"])
                .await;
            env.penalties
                .apply_penalties(id, s + minutes(31))
                .await
                .unwrap();
            ids.push(id);
        }

        let history = env.penalties.penalty_history("u1", Some(2)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, ids[2]);
        assert_eq!(history[1].session_id, ids[1]);
        assert_eq!(history[0].reason, "Missed check-in: Session 2");
        assert_eq!(history[0].exp_lost, 5);
    }
}
