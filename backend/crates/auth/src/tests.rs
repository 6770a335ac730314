//! Crate-level tests for the auth core
//! Scenarios run against the in-memory store; HTTP tests drive the router.

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};

    use platform::client::ClientInfo;

    use crate::application::notifier::{DeliveryError, LoginCodeDelivery, LoginCodeNotifier};
    use kernel::id::UserId;

    use crate::application::{
        AuthConfig, DeviceSessionRegistry, ImpersonationService, LoginChallengeService,
        RefreshTokenLedger, TokenValidator, UserDirectory,
    };
    use crate::domain::entity::{DeviceSession, User};
    use crate::domain::value_object::Email;
    use crate::infra::InMemorySessionStore;

    pub fn client() -> ClientInfo {
        ClientInfo::new(
            Some("203.0.113.7".parse().unwrap()),
            Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile/15E148".to_string()),
        )
    }

    pub struct Fixture {
        pub store: Arc<InMemorySessionStore>,
        pub config: Arc<AuthConfig>,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_config(AuthConfig::development())
        }

        pub fn with_config(config: AuthConfig) -> Self {
            Self {
                store: Arc::new(InMemorySessionStore::new()),
                config: Arc::new(config),
            }
        }

        pub fn challenges(&self) -> LoginChallengeService<InMemorySessionStore> {
            LoginChallengeService::new(self.store.clone(), self.config.clone())
        }

        pub fn directory(&self) -> UserDirectory<InMemorySessionStore> {
            UserDirectory::new(self.store.clone())
        }

        pub fn registry(&self) -> DeviceSessionRegistry<InMemorySessionStore> {
            DeviceSessionRegistry::new(self.store.clone(), self.config.clone())
        }

        pub fn ledger(&self) -> RefreshTokenLedger<InMemorySessionStore> {
            RefreshTokenLedger::new(self.store.clone(), self.config.clone())
        }

        pub fn validator(&self) -> TokenValidator<InMemorySessionStore> {
            TokenValidator::new(self.store.clone(), self.config.clone())
        }

        /// Service for which `admin` is the only configured admin
        pub fn impersonation(&self, admin: UserId) -> ImpersonationService<InMemorySessionStore> {
            let config = AuthConfig {
                admin_user_ids: vec![admin],
                ..(*self.config).clone()
            };
            ImpersonationService::new(self.store.clone(), Arc::new(config))
        }

        pub async fn user_with_session(&self, email: &str) -> (User, DeviceSession) {
            let user = self
                .directory()
                .find_or_create_by_email(&Email::new(email).unwrap())
                .await
                .unwrap();
            let session = self
                .registry()
                .create(user.user_id, Some("Web Browser".to_string()), &client())
                .await
                .unwrap();
            (user, session)
        }
    }

    /// Keeps every delivery for inspection
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub deliveries: Arc<Mutex<Vec<LoginCodeDelivery>>>,
    }

    impl RecordingNotifier {
        pub fn last(&self) -> LoginCodeDelivery {
            self.deliveries.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl LoginCodeNotifier for RecordingNotifier {
        async fn deliver(&self, delivery: &LoginCodeDelivery) -> Result<(), DeliveryError> {
            self.deliveries.lock().unwrap().push(delivery.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    pub struct FailingNotifier;

    impl LoginCodeNotifier for FailingNotifier {
        async fn deliver(&self, _delivery: &LoginCodeDelivery) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("smtp down".to_string()))
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use chrono::Duration;

    use super::support::Fixture;
    use crate::domain::repository::LoginChallengeRepository;
    use crate::domain::value_object::{Email, LoginCode};
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_code_is_redeemable_once() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::seconds(600))
            .await
            .unwrap();

        let consumed = fx
            .challenges()
            .consume(challenge.challenge_id, &code)
            .await
            .unwrap();
        assert!(consumed.consumed_at.is_some());
        assert_eq!(consumed.email.as_str(), "a@b.com");

        let again = fx.challenges().consume(challenge.challenge_id, &code).await;
        assert!(matches!(again, Err(AuthError::ChallengeAlreadyConsumed)));
    }

    #[tokio::test]
    async fn test_five_wrong_codes_exhaust_the_challenge() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::seconds(600))
            .await
            .unwrap();

        for _ in 0..5 {
            let result = fx
                .challenges()
                .consume(challenge.challenge_id, &LoginCode::from_input("000000"))
                .await;
            assert!(matches!(result, Err(AuthError::CodeMismatch)));
        }

        let result = fx.challenges().consume(challenge.challenge_id, &code).await;
        assert!(matches!(result, Err(AuthError::ChallengeExhausted)));

        let stored = fx
            .store
            .find_challenge(challenge.challenge_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts, 5);
        assert!(stored.consumed_at.is_none());
    }

    #[tokio::test]
    async fn test_rotated_secret_cannot_be_rotated_again() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;

        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let t1 = fx.ledger().rotate(&t0.secret).await.unwrap();
        assert_eq!(t1.token.device_session_id, session.session_id);

        let replay = fx.ledger().rotate(&t0.secret).await;
        assert!(matches!(replay, Err(AuthError::TokenInvalid)));

        let auth = fx.validator().validate(&t1.secret).await.unwrap();
        assert_eq!(auth.user.user_id, user.user_id);
        assert_eq!(auth.token.token_id, t1.token.token_id);

        let stale = fx.validator().validate(&t0.secret).await;
        assert!(matches!(stale, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_deleted_user_fails_validation_immediately() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let t1 = fx.ledger().rotate(&t0.secret).await.unwrap();
        assert!(fx.validator().validate(&t1.secret).await.is_ok());

        assert!(fx.directory().soft_delete(user.user_id).await.unwrap());

        let result = fx.validator().validate(&t1.secret).await;
        assert!(matches!(result, Err(AuthError::UserDeleted)));
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_invalidates_current_token() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let t1 = fx.ledger().rotate(&t0.secret).await.unwrap();

        let revoked = fx.ledger().revoke_all_for_user(user.user_id).await.unwrap();
        assert_eq!(revoked, 1);

        let result = fx.validator().validate(&t1.secret).await;
        assert!(matches!(result, Err(AuthError::TokenInvalid)));
    }
}

#[cfg(test)]
mod property_tests {
    use chrono::Duration;

    use super::support::{Fixture, client};
    use crate::application::AuthConfig;
    use crate::domain::repository::{
        DeviceSessionRepository, LoginChallengeRepository, RefreshTokenRepository,
    };
    use crate::domain::value_object::{Email, LoginCode, SecretHash};
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_expired_challenge_fails_even_with_correct_code() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::zero())
            .await
            .unwrap();

        let result = fx.challenges().consume(challenge.challenge_id, &code).await;
        assert!(matches!(result, Err(AuthError::ChallengeExpired)));

        // Failed on expiry, so no attempt was counted
        let stored = fx
            .store
            .find_challenge(challenge.challenge_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts, 0);
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_not_found() {
        let fx = Fixture::new();
        let result = fx
            .challenges()
            .consume(Default::default(), &LoginCode::from_input("123456"))
            .await;
        assert!(matches!(result, Err(AuthError::ChallengeNotFound)));
    }

    #[tokio::test]
    async fn test_correct_code_on_last_attempt_succeeds() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::seconds(600))
            .await
            .unwrap();

        for _ in 0..4 {
            let _ = fx
                .challenges()
                .consume(challenge.challenge_id, &LoginCode::from_input("111111"))
                .await;
        }

        let consumed = fx
            .challenges()
            .consume(challenge.challenge_id, &code)
            .await
            .unwrap();
        assert_eq!(consumed.attempts, 5);
    }

    #[tokio::test]
    async fn test_concurrent_consume_succeeds_once() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::seconds(600))
            .await
            .unwrap();

        let (a, b) = (fx.challenges(), fx.challenges());
        let (first, second) = tokio::join!(
            a.consume(challenge.challenge_id, &code),
            b.consume(challenge.challenge_id, &code)
        );
        assert_eq!(
            [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_rotation_mints_one_successor() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();

        let (a, b) = (fx.ledger(), fx.ledger());
        let (first, second) = tokio::join!(a.rotate(&t0.secret), b.rotate(&t0.secret));
        assert!(first.is_ok() != second.is_ok());

        let active = fx
            .store
            .revoke_tokens_for_session(user.user_id, session.session_id, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_only_hashes_are_stored() {
        let fx = Fixture::new();
        let code = LoginCode::from_input("482913");
        let challenge = fx
            .challenges()
            .create(Email::new("a@b.com").unwrap(), &code, Duration::seconds(600))
            .await
            .unwrap();
        let stored = fx
            .store
            .find_challenge(challenge.challenge_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.code_hash.as_str(), "482913");
        assert_eq!(stored.code_hash, SecretHash::of("482913"));

        let (user, session) = fx.user_with_session("a@b.com").await;
        let issued = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let stored = fx
            .store
            .find_latest_token(&issued.secret.hash())
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.token_hash.as_str(), issued.secret.expose());
        assert!(!stored.token_hash.as_str().contains(issued.secret.expose()));
    }

    #[tokio::test]
    async fn test_expired_token_never_validates() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let issued = fx
            .ledger()
            .issue_with_ttl(user.user_id, session.session_id, Duration::zero())
            .await
            .unwrap();

        let result = fx.validator().validate(&issued.secret).await;
        assert!(matches!(result, Err(AuthError::TokenInvalid)));
        assert!(matches!(
            fx.ledger().rotate(&issued.secret).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_validate_touches_session() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let issued = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fx.validator().validate(&issued.secret).await.unwrap();

        let touched = fx
            .store
            .find_session(session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(touched.last_used_at > session.last_used_at);
    }

    #[tokio::test]
    async fn test_replay_does_not_revoke_family_by_default() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let t1 = fx.ledger().rotate(&t0.secret).await.unwrap();

        assert!(fx.ledger().rotate(&t0.secret).await.is_err());
        assert!(fx.validator().validate(&t1.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_replay_revokes_family_when_enabled() {
        let fx = Fixture::with_config(AuthConfig {
            revoke_family_on_reuse: true,
            ..AuthConfig::development()
        });
        let (user, session) = fx.user_with_session("a@b.com").await;
        let t0 = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        let t1 = fx.ledger().rotate(&t0.secret).await.unwrap();

        assert!(matches!(
            fx.ledger().rotate(&t0.secret).await,
            Err(AuthError::TokenInvalid)
        ));
        assert!(matches!(
            fx.validator().validate(&t1.secret).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn test_sessions_listed_most_recent_first() {
        let fx = Fixture::new();
        let (user, older) = fx.user_with_session("a@b.com").await;
        let newer = fx
            .registry()
            .create(user.user_id, None, &client())
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        fx.registry().touch(older.session_id).await.unwrap();

        let listed = fx.registry().list(user.user_id).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec![older.session_id, newer.session_id]);
    }

    #[tokio::test]
    async fn test_revoke_session_leaves_other_devices() {
        let fx = Fixture::new();
        let (user, phone) = fx.user_with_session("a@b.com").await;
        let laptop = fx
            .registry()
            .create(user.user_id, None, &client())
            .await
            .unwrap();
        let phone_token = fx.ledger().issue(user.user_id, phone.session_id).await.unwrap();
        let laptop_token = fx.ledger().issue(user.user_id, laptop.session_id).await.unwrap();

        assert_eq!(
            fx.registry()
                .revoke(user.user_id, phone.session_id)
                .await
                .unwrap(),
            1
        );
        assert!(fx.validator().validate(&phone_token.secret).await.is_err());
        assert!(fx.validator().validate(&laptop_token.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_refused_after_soft_delete() {
        let fx = Fixture::new();
        let (user, session) = fx.user_with_session("a@b.com").await;
        let issued = fx.ledger().issue(user.user_id, session.session_id).await.unwrap();
        fx.directory().soft_delete(user.user_id).await.unwrap();

        assert!(matches!(
            fx.ledger().rotate(&issued.secret).await,
            Err(AuthError::UserDeleted)
        ));

        // No successor: the presented token is still the latest and unrevoked
        let latest = fx
            .store
            .find_latest_token(&issued.secret.hash())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.token_id, issued.token.token_id);
        assert!(!latest.is_revoked());
    }
}

#[cfg(test)]
mod flow_tests {
    use std::sync::Arc;

    use platform::rate_limit::InMemoryRateLimitStore;

    use kernel::id::UserId;

    use super::support::{FailingNotifier, Fixture, RecordingNotifier, client};
    use crate::application::{
        AuthConfig, ExternalIdentity, RequestLoginCodeUseCase, SignInUseCase,
    };
    use crate::domain::value_object::{ChallengeId, RefreshSecret};
    use crate::error::AuthError;
    use crate::infra::InMemorySessionStore;

    fn request_code(
        fx: &Fixture,
        notifier: RecordingNotifier,
    ) -> RequestLoginCodeUseCase<InMemorySessionStore, InMemoryRateLimitStore, RecordingNotifier>
    {
        RequestLoginCodeUseCase::new(
            fx.store.clone(),
            Arc::new(InMemoryRateLimitStore::new()),
            Arc::new(notifier),
            fx.config.clone(),
        )
    }

    async fn sign_in_with_code(fx: &Fixture, email: &str) -> crate::application::SignInOutput {
        let notifier = RecordingNotifier::default();
        let challenge_id = request_code(fx, notifier.clone())
            .execute(email, &client())
            .await
            .unwrap();
        let delivery = notifier.last();
        SignInUseCase::new(fx.store.clone(), fx.config.clone())
            .with_code(challenge_id, &delivery.code, &client())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_code_delivers_code_and_link() {
        let fx = Fixture::new();
        let notifier = RecordingNotifier::default();
        let challenge_id = request_code(&fx, notifier.clone())
            .execute("  Lifter@Example.com ", &client())
            .await
            .unwrap();

        let delivery = notifier.last();
        assert_eq!(delivery.challenge_id, challenge_id);
        assert_eq!(delivery.email.as_str(), "lifter@example.com");
        assert_eq!(delivery.code.as_str().len(), 6);
        assert_eq!(
            delivery.login_link,
            format!(
                "http://localhost:3002/login?challenge={}&code={}",
                challenge_id,
                delivery.code.as_str()
            )
        );
    }

    #[tokio::test]
    async fn test_request_code_rejects_bad_email() {
        let fx = Fixture::new();
        let result = request_code(&fx, RecordingNotifier::default())
            .execute("not-an-email", &client())
            .await;
        assert!(matches!(result, Err(AuthError::InvalidEmail(_))));
    }

    #[tokio::test]
    async fn test_request_code_is_rate_limited_per_email_and_ip() {
        let fx = Fixture::new();
        let use_case = request_code(&fx, RecordingNotifier::default());

        for _ in 0..5 {
            use_case.execute("a@b.com", &client()).await.unwrap();
        }
        assert!(matches!(
            use_case.execute("a@b.com", &client()).await,
            Err(AuthError::RateLimited)
        ));
        // Another email from the same address has its own budget
        assert!(use_case.execute("c@d.com", &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let fx = Fixture::new();
        let use_case = RequestLoginCodeUseCase::new(
            fx.store.clone(),
            Arc::new(InMemoryRateLimitStore::new()),
            Arc::new(FailingNotifier),
            fx.config.clone(),
        );
        let challenge_id: ChallengeId = use_case.execute("a@b.com", &client()).await.unwrap();
        assert!(
            fx.challenges()
                .consume(challenge_id, &crate::domain::value_object::LoginCode::from_input("x"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_sign_in_with_code_creates_user_session_and_token() {
        let fx = Fixture::new();
        let output = sign_in_with_code(&fx, "a@b.com").await;

        assert_eq!(output.user.email.as_str(), "a@b.com");
        assert_eq!(output.session.user_id, output.user.user_id);
        assert_eq!(output.session.device_name.as_deref(), Some("Mobile Browser"));
        assert_eq!(output.session.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(output.issued.token.device_session_id, output.session.session_id);

        let auth = fx.validator().validate(&output.issued.secret).await.unwrap();
        assert_eq!(auth.user.user_id, output.user.user_id);

        // Second sign-in reuses the account, new device session
        let again = sign_in_with_code(&fx, "A@B.com").await;
        assert_eq!(again.user.user_id, output.user.user_id);
        assert_ne!(again.session.session_id, output.session.session_id);
    }

    #[tokio::test]
    async fn test_deleted_user_cannot_sign_in_again() {
        let fx = Fixture::new();
        let output = sign_in_with_code(&fx, "a@b.com").await;
        fx.directory().soft_delete(output.user.user_id).await.unwrap();

        let notifier = RecordingNotifier::default();
        let challenge_id = request_code(&fx, notifier.clone())
            .execute("a@b.com", &client())
            .await
            .unwrap();
        let result = SignInUseCase::new(fx.store.clone(), fx.config.clone())
            .with_code(challenge_id, &notifier.last().code, &client())
            .await;
        assert!(matches!(result, Err(AuthError::UserDeleted)));
    }

    #[tokio::test]
    async fn test_external_identity_adopts_name_once() {
        let fx = Fixture::new();
        let use_case = SignInUseCase::new(fx.store.clone(), fx.config.clone());
        let identity = ExternalIdentity {
            provider: "google".to_string(),
            email: "Ada@Example.com".to_string(),
            display_name: Some("Ada Lovelace".to_string()),
        };

        let first = use_case
            .with_external_identity(&identity, &client())
            .await
            .unwrap();
        assert_eq!(first.user.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(first.session.device_name.as_deref(), Some("Google Login"));

        let renamed = ExternalIdentity {
            display_name: Some("Countess".to_string()),
            ..identity
        };
        let second = use_case
            .with_external_identity(&renamed, &client())
            .await
            .unwrap();
        assert_eq!(second.user.user_id, first.user.user_id);
        assert_eq!(second.user.display_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_impersonation_grant_is_single_use() {
        let fx = Fixture::new();
        let (admin, _) = fx.user_with_session("admin@b.com").await;
        let (member, _) = fx.user_with_session("member@b.com").await;
        let service = fx.impersonation(admin.user_id);

        let minted = service.grant(admin.user_id, member.user_id).await.unwrap();
        assert_eq!(minted.target.user_id, member.user_id);

        let output = service.redeem(&minted.token, &client()).await.unwrap();
        assert_eq!(output.admin_user_id, admin.user_id);
        assert_eq!(output.user.user_id, member.user_id);
        assert_eq!(
            output.session.device_name.as_deref(),
            Some("Impersonation by admin@b.com")
        );
        assert_eq!(
            output.issued.token.expires_at - output.issued.token.created_at,
            chrono::Duration::hours(4)
        );

        let auth = fx.validator().validate(&output.issued.secret).await.unwrap();
        assert_eq!(auth.user.user_id, member.user_id);

        assert!(matches!(
            service.redeem(&minted.token, &client()).await,
            Err(AuthError::GrantAlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_expired_or_unknown_grant_is_refused() {
        let fx = Fixture::with_config(AuthConfig {
            impersonation_ttl: std::time::Duration::ZERO,
            ..AuthConfig::development()
        });
        let (admin, _) = fx.user_with_session("admin@b.com").await;
        let (member, _) = fx.user_with_session("member@b.com").await;
        let service = fx.impersonation(admin.user_id);

        let minted = service.grant(admin.user_id, member.user_id).await.unwrap();
        assert!(matches!(
            service.redeem(&minted.token, &client()).await,
            Err(AuthError::GrantExpired)
        ));
        assert!(matches!(
            service.redeem(&RefreshSecret::generate(), &client()).await,
            Err(AuthError::GrantNotFound)
        ));
    }

    #[tokio::test]
    async fn test_only_admins_mint_grants_for_non_admins() {
        let fx = Fixture::new();
        let (admin, _) = fx.user_with_session("admin@b.com").await;
        let (member, _) = fx.user_with_session("member@b.com").await;
        let service = fx.impersonation(admin.user_id);

        assert!(matches!(
            service.grant(member.user_id, admin.user_id).await,
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            service.grant(admin.user_id, admin.user_id).await,
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            service.grant(admin.user_id, UserId::new(999)).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_grant_for_deleted_target_cannot_be_redeemed() {
        let fx = Fixture::new();
        let (admin, _) = fx.user_with_session("admin@b.com").await;
        let (member, _) = fx.user_with_session("member@b.com").await;
        let service = fx.impersonation(admin.user_id);

        let minted = service.grant(admin.user_id, member.user_id).await.unwrap();
        fx.directory().soft_delete(member.user_id).await.unwrap();

        assert!(matches!(
            service.redeem(&minted.token, &client()).await,
            Err(AuthError::UserDeleted)
        ));
        // Only the member's own session; none was opened for the grant
        assert_eq!(fx.registry().list(member.user_id).await.unwrap().len(), 1);
    }
}

#[cfg(test)]
mod http_tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, Response, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use std::sync::Arc;

    use kernel::id::UserId;

    use super::support::RecordingNotifier;
    use crate::application::{AuthConfig, UserDirectory};
    use crate::domain::entity::NewUser;
    use crate::domain::repository::UserRepository;
    use crate::domain::value_object::Email;
    use crate::infra::InMemorySessionStore;
    use crate::presentation::router::auth_router_generic;

    fn app() -> (Router, RecordingNotifier) {
        app_with(InMemorySessionStore::new(), AuthConfig::development())
    }

    /// Router over a store the test keeps a handle to
    fn app_with(store: InMemorySessionStore, config: AuthConfig) -> (Router, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let app = auth_router_generic(store, notifier.clone(), config)
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (app, notifier)
    }

    /// Router with admin@b.com configured as admin; returns the admin's id
    async fn admin_app() -> (Router, RecordingNotifier, i64) {
        let store = InMemorySessionStore::new();
        let admin = store
            .insert_user_or_get(&NewUser::new(Email::new("admin@b.com").unwrap()))
            .await
            .unwrap();
        let config = AuthConfig {
            admin_user_ids: vec![admin.user_id],
            ..AuthConfig::development()
        };
        let (app, notifier) = app_with(store, config);
        (app, notifier, admin.user_id.get())
    }

    async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_json_with_cookie(uri: &str, body: Value, cookie: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(res: Response<Body>) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie(res: &Response<Body>, name: &str) -> Option<String> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Full code sign-in; returns (refresh secret, session id)
    async fn sign_in(app: &Router, notifier: &RecordingNotifier, email: &str) -> (String, i64) {
        let res = send(app, post_json("/email-code/request", json!({ "email": email }))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let challenge_id = body_json(res).await["challengeId"]
            .as_str()
            .unwrap()
            .to_string();

        let code = notifier.last().code.as_str().to_string();
        let res = send(
            app,
            post_json(
                "/email-code/verify",
                json!({ "challengeId": challenge_id, "code": code }),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let secret = set_cookie(&res, "fitq_refresh").unwrap();
        let body = body_json(res).await;
        (secret, body["sessionId"].as_i64().unwrap())
    }

    #[tokio::test]
    async fn test_sign_in_me_refresh_logout() {
        let (app, notifier) = app();
        let (secret, _) = sign_in(&app, &notifier, "Lifter@Example.com").await;

        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={secret}"))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let me = body_json(res).await;
        assert_eq!(me["email"], "lifter@example.com");
        assert_eq!(me["name"], "lifter");
        assert_eq!(me["impersonated"], false);

        let res = send(
            &app,
            with_cookie("POST", "/refresh", &format!("fitq_refresh={secret}")),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let rotated = set_cookie(&res, "fitq_refresh").unwrap();
        assert_ne!(rotated, secret);

        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={secret}"))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = send(
            &app,
            with_cookie("POST", "/logout", &format!("fitq_refresh={rotated}")),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(set_cookie(&res, "fitq_refresh").as_deref(), Some(""));

        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={rotated}"))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_challenge_failures_look_identical() {
        let (app, notifier) = app();
        let res = send(
            &app,
            post_json("/email-code/request", json!({ "email": "a@b.com" })),
        )
        .await;
        let challenge_id = body_json(res).await["challengeId"]
            .as_str()
            .unwrap()
            .to_string();
        let wrong = if notifier.last().code.as_str() == "000000" {
            "111111"
        } else {
            "000000"
        };

        let mismatch = send(
            &app,
            post_json(
                "/email-code/verify",
                json!({ "challengeId": challenge_id, "code": wrong }),
            ),
        )
        .await;
        let unknown = send(
            &app,
            post_json(
                "/email-code/verify",
                json!({ "challengeId": "not-a-challenge", "code": "123456" }),
            ),
        )
        .await;

        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        let (mismatch, unknown) = (body_json(mismatch).await, body_json(unknown).await);
        assert_eq!(mismatch["detail"], "Invalid or expired code");
        assert_eq!(mismatch, unknown);
    }

    #[tokio::test]
    async fn test_request_code_rate_limit_returns_429() {
        let (app, _) = app();
        for _ in 0..5 {
            let res = send(
                &app,
                post_json("/email-code/request", json!({ "email": "a@b.com" })),
            )
            .await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = send(
            &app,
            post_json("/email-code/request", json!({ "email": "a@b.com" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_missing_cookie_is_unauthorized() {
        let (app, _) = app();
        let res = send(&app, Request::get("/me").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["detail"], "Invalid or expired session");

        let res = send(
            &app,
            Request::post("/refresh").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = send(&app, Request::post("/logout").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_impersonation_cookie_takes_precedence() {
        let (app, notifier) = app();
        let (own, _) = sign_in(&app, &notifier, "admin@b.com").await;
        let (impersonated, _) = sign_in(&app, &notifier, "member@b.com").await;
        let both = format!("fitq_refresh={own}; fitq_impersonate={impersonated}");

        let res = send(&app, with_cookie("GET", "/me", &both)).await;
        let me = body_json(res).await;
        assert_eq!(me["email"], "member@b.com");
        assert_eq!(me["impersonated"], true);

        let res = send(&app, with_cookie("POST", "/logout", &both)).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(set_cookie(&res, "fitq_impersonate").as_deref(), Some(""));
        assert!(set_cookie(&res, "fitq_refresh").is_none());

        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={own}"))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["email"], "admin@b.com");

        let res = send(
            &app,
            with_cookie("GET", "/me", &format!("fitq_impersonate={impersonated}")),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_management() {
        let (app, notifier) = app();
        let (laptop, laptop_id) = sign_in(&app, &notifier, "a@b.com").await;
        let (phone, phone_id) = sign_in(&app, &notifier, "a@b.com").await;
        let laptop_cookie = format!("fitq_refresh={laptop}");
        let phone_cookie = format!("fitq_refresh={phone}");

        let res = send(&app, with_cookie("GET", "/sessions", &laptop_cookie)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let sessions = body_json(res).await["sessions"].as_array().unwrap().clone();
        assert_eq!(sessions.len(), 2);
        let current: Vec<_> = sessions
            .iter()
            .filter(|s| s["isCurrent"] == true)
            .map(|s| s["id"].as_i64().unwrap())
            .collect();
        assert_eq!(current, vec![laptop_id]);

        let res = send(
            &app,
            with_cookie("DELETE", &format!("/sessions/{phone_id}"), &laptop_cookie),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = send(&app, with_cookie("GET", "/me", &phone_cookie)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let res = send(&app, with_cookie("GET", "/me", &laptop_cookie)).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app, with_cookie("DELETE", "/sessions", &laptop_cookie)).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = send(&app, with_cookie("GET", "/me", &laptop_cookie)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cannot_revoke_another_users_session() {
        let (app, notifier) = app();
        let (victim, victim_session) = sign_in(&app, &notifier, "victim@b.com").await;
        let (attacker, _) = sign_in(&app, &notifier, "attacker@b.com").await;

        let res = send(
            &app,
            with_cookie(
                "DELETE",
                &format!("/sessions/{victim_session}"),
                &format!("fitq_refresh={attacker}"),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={victim}"))).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_refused_after_soft_delete() {
        let store = InMemorySessionStore::new();
        let (app, notifier) = app_with(store.clone(), AuthConfig::development());
        let (secret, _) = sign_in(&app, &notifier, "gone@b.com").await;
        let cookie = format!("fitq_refresh={secret}");
        let res = send(&app, with_cookie("GET", "/me", &cookie)).await;
        let user_id = body_json(res).await["id"].as_i64().unwrap();

        UserDirectory::new(Arc::new(store))
            .soft_delete(UserId::new(user_id))
            .await
            .unwrap();

        let res = send(&app, with_cookie("POST", "/refresh", &cookie)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookie(&res, "fitq_refresh").is_none());
        assert_eq!(body_json(res).await["detail"], "Invalid or expired session");
    }

    #[tokio::test]
    async fn test_impersonation_grant_and_redeem() {
        let (app, notifier, admin_id) = admin_app().await;
        let (admin, _) = sign_in(&app, &notifier, "admin@b.com").await;
        let (member, _) = sign_in(&app, &notifier, "member@b.com").await;
        let res = send(&app, with_cookie("GET", "/me", &format!("fitq_refresh={member}"))).await;
        let member_id = body_json(res).await["id"].as_i64().unwrap();

        let res = send(
            &app,
            post_json_with_cookie(
                "/impersonation/grants",
                json!({ "userId": member_id }),
                &format!("fitq_refresh={admin}"),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let grant = body_json(res).await;
        let token = grant["token"].as_str().unwrap().to_string();
        assert_eq!(
            grant["url"],
            format!("http://localhost:3002/auth/impersonate?token={token}")
        );
        assert_eq!(grant["user"]["email"], "member@b.com");

        let res = send(&app, post_json("/impersonate", json!({ "token": token }))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let raw = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(raw.starts_with("fitq_impersonate="));
        assert!(raw.contains("Max-Age=14400"));
        let impersonated = set_cookie(&res, "fitq_impersonate").unwrap();
        let body = body_json(res).await;
        assert_eq!(body["adminId"], admin_id);
        assert_eq!(body["user"]["id"], member_id);
        assert_eq!(body["user"]["email"], "member@b.com");

        // The admin's own cookie still loses to the impersonation one
        let both = format!("fitq_refresh={admin}; fitq_impersonate={impersonated}");
        let res = send(&app, with_cookie("GET", "/me", &both)).await;
        let me = body_json(res).await;
        assert_eq!(me["email"], "member@b.com");
        assert_eq!(me["impersonated"], true);

        let res = send(&app, with_cookie("GET", "/sessions", &both)).await;
        let sessions = body_json(res).await["sessions"].as_array().unwrap().clone();
        let current: Vec<_> = sessions.iter().filter(|s| s["isCurrent"] == true).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0]["deviceName"], "Impersonation by admin@b.com");

        let res = send(&app, post_json("/impersonate", json!({ "token": token }))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(res).await["detail"],
            "Impersonation token expired or already used"
        );
    }

    #[tokio::test]
    async fn test_impersonation_rejections() {
        let (app, notifier, admin_id) = admin_app().await;
        let (member, _) = sign_in(&app, &notifier, "member@b.com").await;

        let res = send(&app, post_json("/impersonate", json!({ "token": "  " }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = send(&app, post_json("/impersonate", json!({ "token": "deadbeef" }))).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(
            &app,
            post_json_with_cookie(
                "/impersonation/grants",
                json!({ "userId": admin_id }),
                &format!("fitq_refresh={member}"),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(
            &app,
            post_json("/impersonation/grants", json!({ "userId": admin_id })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

#[cfg(test)]
mod error_tests {
    use crate::error::{AuthError, INVALID_CODE_MESSAGE, INVALID_SESSION_MESSAGE};
    use kernel::error::kind::ErrorKind;

    #[test]
    fn test_challenge_failures_collapse() {
        for err in [
            AuthError::ChallengeNotFound,
            AuthError::ChallengeExpired,
            AuthError::ChallengeExhausted,
            AuthError::ChallengeAlreadyConsumed,
            AuthError::CodeMismatch,
        ] {
            assert!(err.is_challenge_failure());
            let app = err.to_app_error();
            assert_eq!(app.kind(), ErrorKind::BadRequest);
            assert_eq!(app.message(), INVALID_CODE_MESSAGE);
        }
    }

    #[test]
    fn test_credential_failures_collapse() {
        for err in [
            AuthError::TokenInvalid,
            AuthError::UserDeleted,
            AuthError::Unauthenticated,
        ] {
            let app = err.to_app_error();
            assert_eq!(app.status_code(), 401);
            assert_eq!(app.message(), INVALID_SESSION_MESSAGE);
        }
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let app = AuthError::Internal("pool exploded at 10.0.0.3".to_string()).to_app_error();
        assert_eq!(app.status_code(), 500);
        assert!(!app.message().contains("10.0.0.3"));

        let app = AuthError::Database(sqlx::Error::PoolTimedOut).to_app_error();
        assert_eq!(app.kind(), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn test_grant_failure_statuses() {
        assert_eq!(AuthError::GrantNotFound.status_code(), 404);
        for err in [AuthError::GrantExpired, AuthError::GrantAlreadyUsed] {
            let app = err.to_app_error();
            assert_eq!(app.status_code(), 401);
            assert_eq!(app.message(), "Impersonation token expired or already used");
        }
        assert_eq!(AuthError::Forbidden.status_code(), 403);
        assert_eq!(AuthError::UserNotFound.status_code(), 404);
    }

    #[test]
    fn test_rate_limited_is_429() {
        assert_eq!(AuthError::RateLimited.status_code(), 429);
        assert_eq!(AuthError::InvalidEmail("x".into()).status_code(), 400);
    }
}
