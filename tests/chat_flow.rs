//! Chat-path behavior across components: bounded history, the per-user gate,
//! and credential revocation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use raffica::auth::RevocationSet;
use raffica::chat::{ChatError, ChatLimits, ChatService, CompletionError, CompletionProvider};
use raffica::limit::RateLimiter;
use raffica::session::{ConversationLog, Role, StoredMessage};
use raffica::store::{MemoryStore, StoreHandle};

struct CannedProvider;

#[async_trait]
impl CompletionProvider for CannedProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[StoredMessage],
        user_message: &str,
    ) -> Result<String, CompletionError> {
        Ok(format!("re: {user_message}"))
    }
}

fn handle() -> StoreHandle {
    StoreHandle::new(Arc::new(MemoryStore::new()), Duration::from_millis(100))
}

#[tokio::test(start_paused = true)]
async fn a_long_conversation_keeps_only_the_newest_hundred() {
    let log = ConversationLog::new(handle(), 100, Duration::from_secs(86_400));

    for i in 0..105 {
        log.append("s1", Role::User, format!("m{i}")).await.unwrap();
    }

    let window = log.window("s1", 200).await;
    assert_eq!(window.len(), 100);
    // the five oldest are gone for good
    assert_eq!(window.first().unwrap().content, "m5");
    assert_eq!(window.last().unwrap().content, "m104");
    assert!(window.windows(2).all(|pair| pair[0].seq < pair[1].seq));
}

#[tokio::test(start_paused = true)]
async fn ten_chats_pass_the_eleventh_is_denied() {
    let store = handle();
    let service = ChatService::new(
        ConversationLog::new(store.clone(), 100, Duration::from_secs(86_400)),
        RateLimiter::new(store),
        Arc::new(CannedProvider),
        ChatLimits {
            max_requests: 10,
            window: Duration::from_secs(60),
            context_window: 10,
        },
    );

    for i in 0..10 {
        let reply = service
            .respond("u1", "u1:p1", "system", &format!("q{i}"))
            .await
            .unwrap();
        assert_eq!(reply.text, format!("re: q{i}"));
    }

    tokio::time::advance(Duration::from_secs(10)).await;
    match service.respond("u1", "u1:p1", "system", "q10").await {
        Err(ChatError::RateLimited { retry_after }) => {
            // the window opened 10 seconds ago
            assert!(retry_after <= Duration::from_secs(50));
            assert!(retry_after > Duration::ZERO);
        }
        other => panic!("expected a denial, got {other:?}"),
    }

    // once the window resets the same user chats again
    tokio::time::advance(Duration::from_secs(51)).await;
    assert!(service.respond("u1", "u1:p1", "system", "again").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn revoked_credentials_stay_revoked_for_their_lifetime() {
    let revocations = RevocationSet::new(handle());

    // logout with fifteen minutes left on the token
    revocations
        .revoke("jti-abc", Duration::from_secs(900))
        .await
        .unwrap();

    assert!(revocations.is_revoked("jti-abc").await);
    tokio::time::advance(Duration::from_secs(600)).await;
    assert!(revocations.is_revoked("jti-abc").await);

    // past natural expiry the record disappears
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(!revocations.is_revoked("jti-abc").await);
}

#[tokio::test(start_paused = true)]
async fn chat_history_survives_rate_denials_intact() {
    let store = handle();
    let log = ConversationLog::new(store.clone(), 100, Duration::from_secs(86_400));
    let service = ChatService::new(
        log,
        RateLimiter::new(store.clone()),
        Arc::new(CannedProvider),
        ChatLimits {
            max_requests: 1,
            window: Duration::from_secs(60),
            context_window: 10,
        },
    );

    service.respond("u1", "s", "system", "hello").await.unwrap();
    let _ = service.respond("u1", "s", "system", "blocked").await;

    let log = ConversationLog::new(store, 100, Duration::from_secs(86_400));
    let window = log.window("s", 10).await;
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].content, "hello");
    assert_eq!(window[1].content, "re: hello");
}
