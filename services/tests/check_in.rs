mod helpers;

#[cfg(test)]
mod tests {
    use crate::helpers::{base_time, minutes, setup};
    use services::AttendanceError;

    /// Test Case: A scan inside the window credits the reward once
    #[tokio::test]
    async fn test_check_in_success() {
        let env = setup().await;
        env.profile("u1", 40, 1).await;
        let start = base_time();
        let (token, id) = env
            .session("Stand-up", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        let receipt = env
            .check_ins
            .check_in(&token, "u1", start + minutes(5))
            .await
            .expect("check-in failed");

        assert_eq!(receipt.session_id, id);
        assert_eq!(receipt.session_title, "Stand-up");
        assert_eq!(receipt.exp_earned, 10);
        assert_eq!(receipt.new_exp, 50);
        assert_eq!(receipt.new_level, 1);
        assert!(!receipt.leveled_up);

        let profile = env.reload_profile("u1").await;
        assert_eq!(profile.exp, 50);
        assert_eq!(profile.total_check_ins, 1);
        assert_eq!(profile.last_check_in, Some(start + minutes(5)));

        let detail = env.detail_by_token(&token).await;
        assert!(detail.has_attended("u1"));

        let history = env.check_ins.check_in_history("u1", None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].exp_earned, 10);
        assert_eq!(history[0].session_id, id);
    }

    /// Test Case: Second scan is refused and credits nothing
    #[tokio::test]
    async fn test_duplicate_check_in_rejected() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, id) = env
            .session("Stand-up", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        env.check_ins
            .check_in(&token, "u1", start + minutes(1))
            .await
            .unwrap();
        let second = env.check_ins.check_in(&token, "u1", start + minutes(2)).await;

        match second {
            Err(AttendanceError::AlreadyCheckedIn { session_id, user_id }) => {
                assert_eq!(session_id, id);
                assert_eq!(user_id, "u1");
            }
            other => panic!("expected AlreadyCheckedIn, got {other:?}"),
        }
        let profile = env.reload_profile("u1").await;
        assert_eq!(profile.exp, 10);
        assert_eq!(profile.total_check_ins, 1);
    }

    /// Test Case: Concurrent scans by one user credit exactly once
    #[tokio::test]
    async fn test_concurrent_check_ins_credit_once() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Rush", start, start + minutes(60), 10, 5, &["u1"])
            .await;
        let at = start + minutes(3);

        let (a, b, c) = tokio::join!(
            env.check_ins.check_in(&token, "u1", at),
            env.check_ins.check_in(&token, "u1", at),
            env.check_ins.check_in(&token, "u1", at),
        );

        let results = [a, b, c];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for failure in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(failure, AttendanceError::AlreadyCheckedIn { .. }));
        }

        let profile = env.reload_profile("u1").await;
        assert_eq!(profile.exp, 10);
        assert_eq!(profile.total_check_ins, 1);
        assert_eq!(env.check_ins.check_in_history("u1", None).await.unwrap().len(), 1);
    }

    /// Test Case: Scan before the start is refused without side effects
    #[tokio::test]
    async fn test_check_in_before_start() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Later", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        let result = env.check_ins.check_in(&token, "u1", start - minutes(1)).await;

        match result {
            Err(AttendanceError::SessionNotStarted { title, starts_at }) => {
                assert_eq!(title, "Later");
                assert_eq!(starts_at, start);
            }
            other => panic!("expected SessionNotStarted, got {other:?}"),
        }
        assert_eq!(env.reload_profile("u1").await.exp, 0);
        assert!(env.detail_by_token(&token).await.attendees.is_empty());
    }

    /// Test Case: The end instant itself is outside the window
    #[tokio::test]
    async fn test_check_in_at_end_is_refused() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let end = start + minutes(60);
        let (token, _) = env.session("Closing", start, end, 10, 5, &["u1"]).await;

        let result = env.check_ins.check_in(&token, "u1", end).await;

        assert!(matches!(result, Err(AttendanceError::SessionEnded { ended_at, .. }) if ended_at == end));
        assert_eq!(env.reload_profile("u1").await.exp, 0);
    }

    /// Test Case: Start instant is inside the window
    #[tokio::test]
    async fn test_check_in_at_start_is_accepted() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Opening", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        assert!(env.check_ins.check_in(&token, "u1", start).await.is_ok());
    }

    /// Test Case: Unknown token
    #[tokio::test]
    async fn test_check_in_with_unknown_token() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;

        let result = env
            .check_ins
            .check_in("CHECKIN_qr_0_nothing", "u1", base_time())
            .await;

        assert!(matches!(result, Err(AttendanceError::InvalidToken)));
    }

    /// Test Case: A deactivated session's token no longer resolves
    #[tokio::test]
    async fn test_check_in_after_deactivation() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, id) = env
            .session("Cancelled", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        assert!(env.sessions.deactivate_session(id).await.unwrap());
        let result = env.check_ins.check_in(&token, "u1", start + minutes(1)).await;

        assert!(matches!(result, Err(AttendanceError::InvalidToken)));
        assert_eq!(env.reload_profile("u1").await.total_check_ins, 0);
    }

    /// Test Case: Crossing 100 EXP raises the level
    #[tokio::test]
    async fn test_check_in_levels_up() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Big reward", start, start + minutes(60), 100, 5, &["u1"])
            .await;

        let receipt = env
            .check_ins
            .check_in(&token, "u1", start + minutes(1))
            .await
            .unwrap();

        assert_eq!(receipt.new_exp, 100);
        assert_eq!(receipt.new_level, 2);
        assert!(receipt.leveled_up);
        assert_eq!(env.reload_profile("u1").await.level, 2);
    }

    /// Test Case: Users outside the participant list may still check in
    #[tokio::test]
    async fn test_non_participant_can_check_in() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        env.profile("walk-in", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Open doors", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        let receipt = env
            .check_ins
            .check_in(&token, "walk-in", start + minutes(1))
            .await
            .unwrap();

        assert_eq!(receipt.new_exp, 10);
        let detail = env.detail_by_token(&token).await;
        assert!(detail.has_attended("walk-in"));
        assert!(!detail.all_users.contains("walk-in"));
    }

    /// Test Case: Scanning without a profile fails and leaves no record
    #[tokio::test]
    async fn test_check_in_without_profile() {
        let env = setup().await;
        let start = base_time();
        let (token, _) = env
            .session("Ghosts", start, start + minutes(60), 10, 5, &["ghost"])
            .await;

        let result = env.check_ins.check_in(&token, "ghost", start + minutes(1)).await;

        match result {
            Err(AttendanceError::NotFound { entity, id }) => {
                assert_eq!(entity, "User");
                assert_eq!(id, "ghost");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(env.detail_by_token(&token).await.attendees.is_empty());
    }

    /// Test Case: Surrounding whitespace in a scanned token is ignored
    #[tokio::test]
    async fn test_check_in_trims_token() {
        let env = setup().await;
        env.profile("u1", 0, 1).await;
        let start = base_time();
        let (token, _) = env
            .session("Padded", start, start + minutes(60), 10, 5, &["u1"])
            .await;

        let padded = format!("  {token}\n");
        assert!(env.check_ins.check_in(&padded, "u1", start + minutes(1)).await.is_ok());
    }

    /// Test Case: A user already penalized for the session cannot scan into it afterwards
    #[tokio::test]
    async fn test_check_in_after_penalty_is_refused() {
        let env = setup().await;
        env.profile("u1", 40, 1).await;
        let start = base_time();
        let end = start + minutes(60);
        let (token, id) = env.session("Retro", start, end, 10, 5, &["u1"]).await;

        let report = env.penalties.apply_penalties(id, end).await.unwrap();
        assert_eq!(report.penalized, vec!["u1".to_string()]);

        // A scan stamped inside the window but committed after reconciliation.
        let result = env.check_ins.check_in(&token, "u1", start + minutes(30)).await;

        assert!(matches!(result, Err(AttendanceError::SessionEnded { ended_at, .. }) if ended_at == end));
        let detail = env.detail_by_token(&token).await;
        assert!(detail.attendees.is_empty());
        assert!(detail.penalized_users.contains("u1"));
        let profile = env.reload_profile("u1").await;
        assert_eq!(profile.exp, 35);
        assert_eq!(profile.total_check_ins, 0);
    }
}
