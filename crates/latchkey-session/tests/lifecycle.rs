//! End-to-end session lifecycle tests.
//!
//! Each test drives a real `FileLockStore` in a temp directory and moves
//! time with a shared `ManualClock`. A "request" is one
//! `load_session` → work → `finish` cycle; the token a client would carry
//! is tracked by applying each `TokenDirective` the way a cookie jar would.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use latchkey_protocol::{AccountId, Codec, JsonCodec, ManualClock, Session};
use latchkey_session::{
    RandomTokenSigner, RequestSession, SessionConfig, SessionError,
    SessionManager, SessionRequest, TokenDirective,
};
use latchkey_store::{FileLockStore, LockStore};
use serde_json::json;

// =========================================================================
// Helpers
// =========================================================================

type Manager = SessionManager<FileLockStore, RandomTokenSigner>;

struct Harness {
    _dir: tempfile::TempDir,
    clock: ManualClock,
    manager: Manager,
}

/// valid 60s, forwarding 5s, renewable for 300s of inactivity, t = 0.
fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileLockStore::open(dir.path()).expect("store");
    let clock = ManualClock::new(0);
    let manager = SessionManager::new(
        store,
        RandomTokenSigner,
        SessionConfig::new(60, 5, 300),
    )
    .with_clock(clock.clone());
    Harness {
        _dir: dir,
        clock,
        manager,
    }
}

/// A client that keeps whatever token the server last sent it.
#[derive(Default)]
struct Client {
    token: Option<String>,
}

impl Client {
    fn holding(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    /// Runs one request and applies the resulting directive.
    fn request<R>(
        &mut self,
        manager: &Manager,
        blocking: bool,
        work: impl FnOnce(&mut RequestSession<'_, FileLockStore, RandomTokenSigner>) -> R,
    ) -> R {
        let request = SessionRequest {
            token: self.token.as_deref(),
            blocking,
        };
        let mut session = manager.load_session(&request).expect("load");
        let result = work(&mut session);
        match session.finish().expect("finish") {
            TokenDirective::Unchanged => {}
            TokenDirective::Set { sealed, .. } => self.token = Some(sealed),
            TokenDirective::Clear => self.token = None,
        }
        result
    }

    fn token(&self) -> String {
        self.token.clone().expect("client holds a token")
    }
}

fn stored(manager: &Manager, token: &str) -> Option<Session> {
    let raw = manager.store().read_unsafe(token).unwrap()?;
    Some(JsonCodec.decode(&raw).unwrap())
}

// =========================================================================
// Liminal re-issuance
// =========================================================================

#[test]
fn test_load_session_reissues_then_forwards_then_expires() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("cart", json!([7])).unwrap());
    let original = client.token();

    // t=0: active, nothing changes hands.
    let token_at_0 =
        client.request(&h.manager, false, |s| s.token().cloned().unwrap());
    assert_eq!(token_at_0.as_str(), original);
    assert_eq!(client.token(), original);

    // t=61: expired but renewable, so the response carries S2.
    h.clock.set(61);
    client.request(&h.manager, false, |_| ());
    let successor = client.token();
    assert_ne!(successor, original);

    // t=63: the old token forwards to S2's current state.
    h.clock.set(63);
    let mut stale = Client::holding(&original);
    let (token, cart) = stale.request(&h.manager, false, |s| {
        (s.token().cloned().unwrap(), s.get::<Vec<i32>>("cart"))
    });
    assert_eq!(token.as_str(), successor);
    assert_eq!(cart, Some(vec![7]));
    assert_eq!(stale.token(), original, "followers are not sent a new token");

    // t=70: forwarding window closed.
    h.clock.set(70);
    let mut stale = Client::holding(&original);
    let token = stale.request(&h.manager, false, |s| s.token().cloned());
    assert!(token.is_none());
}

#[test]
fn test_load_session_forwarded_writes_land_on_successor() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("n", 1).unwrap());
    let original = client.token();

    h.clock.set(61);
    client.request(&h.manager, false, |_| ());
    let successor = client.token();

    h.clock.set(62);
    Client::holding(&original).request(&h.manager, true, |s| s.set("n", 2).unwrap());

    let session = stored(&h.manager, &successor).unwrap();
    assert_eq!(session.data["n"], json!(2));
}

#[test]
fn test_load_session_past_inactivity_is_never_reissued() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", "v").unwrap());
    let token = client.token();
    let before = h.manager.store().read_unsafe(&token).unwrap();

    h.clock.set(301);
    let bound = client.request(&h.manager, false, |s| s.token().cloned());

    assert!(bound.is_none());
    assert_eq!(client.token(), token, "no directive for a dead token");
    assert_eq!(h.manager.store().read_unsafe(&token).unwrap(), before);
    assert_eq!(h.manager.store().list_all_keys().unwrap(), vec![token]);
}

#[test]
fn test_load_session_reissue_preserves_identity() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| {
        s.upgrade(AccountId(12), vec!["editor".into()]).unwrap();
    });
    let original = client.token();
    let csrf = stored(&h.manager, &original).unwrap().csrf;

    h.clock.set(100);
    client.request(&h.manager, false, |_| ());

    let successor = stored(&h.manager, &client.token()).unwrap();
    assert_eq!(successor.account_id, Some(AccountId(12)));
    assert_eq!(successor.account_roles, vec!["editor".to_string()]);
    assert_eq!(successor.csrf, csrf);
    assert_eq!(successor.issued_at, 100);
}

#[test]
fn test_load_session_forged_token_is_anonymous() {
    let h = harness();
    let mut client = Client::holding("not-a-token");

    let authenticated = client.request(&h.manager, true, |s| s.is_authenticated());

    assert!(!authenticated);
    assert!(h.manager.store().list_all_keys().unwrap().is_empty());
}

// =========================================================================
// Flash data
// =========================================================================

#[test]
fn test_flash_is_delivered_exactly_once() {
    let h = harness();
    let mut client = Client::default();

    client.request(&h.manager, true, |s| {
        s.set_flash("errors", json!(["x"])).unwrap();
    });

    let second = client.request(&h.manager, true, |s| s.flash::<Vec<String>>("errors"));
    assert_eq!(second, Some(vec!["x".to_string()]));

    let third = client.request(&h.manager, true, |s| s.flashes().clone());
    assert!(third.is_empty());
}

#[test]
fn test_flash_survives_reissue() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set_flash("notice", "saved").unwrap());

    h.clock.set(61);
    let notice = client.request(&h.manager, false, |s| s.flash::<String>("notice"));

    assert_eq!(notice.as_deref(), Some("saved"));
}

#[test]
fn test_flash_written_in_same_request_waits_for_next() {
    let h = harness();
    let mut client = Client::default();

    let own = client.request(&h.manager, true, |s| {
        s.set_flash("notice", "hi").unwrap();
        s.flash::<String>("notice")
    });

    assert_eq!(own, None);
}

// =========================================================================
// Upgrade
// =========================================================================

#[test]
fn test_upgrade_rotates_token_and_csrf() {
    let h = harness();
    let mut client = Client::default();
    let anon_csrf = client.request(&h.manager, true, |s| {
        s.set("cart", json!([1])).unwrap();
        s.csrf_token().unwrap()
    });
    let anonymous = client.token();

    h.clock.set(10);
    let csrf = client.request(&h.manager, true, |s| {
        s.upgrade(AccountId(3), vec!["user".into()]).unwrap();
        assert!(s.is_authenticated());
        s.csrf_token().unwrap()
    });
    let upgraded = client.token();

    assert_ne!(upgraded, anonymous);
    assert_ne!(csrf, anon_csrf);

    let session = stored(&h.manager, &upgraded).unwrap();
    assert_eq!(session.account_id, Some(AccountId(3)));
    assert_eq!(session.data["cart"], json!([1]));

    let old = stored(&h.manager, &anonymous).unwrap();
    let forwarding = old.forwarding.expect("anonymous token must forward");
    assert_eq!(forwarding.updated_token.as_str(), upgraded);
    assert_eq!(forwarding.reissued_at, 10);
}

#[test]
fn test_upgrade_after_terminate_relocks() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());

    client.request(&h.manager, true, |s| {
        s.terminate().unwrap();
        s.upgrade(AccountId(8), Vec::new()).unwrap();
    });

    let session = stored(&h.manager, &client.token()).unwrap();
    assert_eq!(session.account_id, Some(AccountId(8)));
    assert!(!h.manager.store().is_locked(&client.token()).unwrap());
}

#[test]
fn test_upgrade_non_blocking_fails() {
    let h = harness();
    let mut client = Client::default();

    let result = client.request(&h.manager, false, |s| s.upgrade(AccountId(1), Vec::new()));

    assert!(matches!(result, Err(SessionError::UpgradeOutsideBlocking)));
}

// =========================================================================
// Termination and write-through
// =========================================================================

#[test]
fn test_finish_stamps_last_used_and_unlocks() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());

    h.clock.set(42);
    client.request(&h.manager, true, |_| ());

    let token = client.token();
    assert_eq!(stored(&h.manager, &token).unwrap().last_used, 42);
    assert!(!h.manager.store().is_locked(&token).unwrap());
}

#[test]
fn test_non_blocking_load_releases_before_work() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let token = client.token();

    let locked_during_work = client.request(&h.manager, false, |_| {
        h.manager.store().is_locked(&token).unwrap()
    });

    assert!(!locked_during_work);
}

#[test]
fn test_write_after_terminate_is_persisted_immediately() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let token = client.token();

    client.request(&h.manager, true, |s| {
        s.terminate().unwrap();
        s.set("k", 2).unwrap();

        assert!(!h.manager.store().is_locked(&token).unwrap());
        assert_eq!(stored(&h.manager, &token).unwrap().data["k"], json!(2));
    });
}

#[test]
fn test_write_through_recovers_when_entry_vanished() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let token = client.token();

    client.request(&h.manager, false, |s| {
        h.manager.store().delete_unsafe_by_key(&token).unwrap();
        s.set("k", 2).unwrap();
    });

    let fresh = client.token();
    assert_ne!(fresh, token);
    assert_eq!(stored(&h.manager, &fresh).unwrap().data["k"], json!(2));
}

#[test]
fn test_drop_without_finish_still_persists() {
    let h = harness();
    let mut session = h
        .manager
        .load_session(&SessionRequest::blocking(None))
        .unwrap();
    session.set("k", "v").unwrap();
    let token = session.token().cloned().unwrap();

    h.clock.set(9);
    drop(session);

    let record = stored(&h.manager, token.as_str()).unwrap();
    assert_eq!(record.last_used, 9);
    assert!(!h.manager.store().is_locked(token.as_str()).unwrap());
}

// =========================================================================
// Destroy
// =========================================================================

#[test]
fn test_destroy_deletes_entry_and_clears_client() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let token = client.token();

    client.request(&h.manager, true, |s| s.destroy().unwrap());

    assert!(client.token.is_none());
    assert!(!h.manager.store().exists_unsafe(&token).unwrap());
}

#[test]
fn test_destroy_on_non_blocking_request_relocks() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let token = client.token();

    client.request(&h.manager, false, |s| s.destroy().unwrap());

    assert!(!h.manager.store().exists_unsafe(&token).unwrap());
}

#[test]
fn test_load_session_forward_to_logged_out_session_is_anonymous() {
    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("cart", json!([1])).unwrap());
    let anonymous = client.token();

    h.clock.set(10);
    client.request(&h.manager, true, |s| s.upgrade(AccountId(3), Vec::new()).unwrap());
    let logged_in = client.token();
    h.clock.set(12);
    client.request(&h.manager, true, |s| s.destroy().unwrap());

    // t=13: the anonymous token still forwards, but its successor is gone.
    h.clock.set(13);
    let mut straggler = Client::holding(&anonymous);
    let (authenticated, token) = straggler.request(&h.manager, false, |s| {
        (s.is_authenticated(), s.token().cloned())
    });

    assert!(!authenticated);
    assert!(token.is_none());
    assert!(!h.manager.store().exists_unsafe(&logged_in).unwrap());
    assert_eq!(
        stored(&h.manager, &anonymous)
            .unwrap()
            .forwarding
            .map(|f| f.updated_token.as_str().to_string()),
        Some(logged_in)
    );
}

// =========================================================================
// Concurrency
// =========================================================================

#[test]
fn test_blocking_requests_serialize_on_one_token() {
    const WORKERS: usize = 8;

    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("count", 0).unwrap());
    let token = client.token();

    let barrier = Barrier::new(WORKERS);
    thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                barrier.wait();
                let mut worker = Client::holding(&token);
                worker.request(&h.manager, true, |s| {
                    let count: u32 = s.get("count").unwrap();
                    thread::sleep(Duration::from_millis(5));
                    s.set("count", count + 1).unwrap();
                });
            });
        }
    });

    let session = stored(&h.manager, &token).unwrap();
    assert_eq!(session.data["count"], json!(WORKERS));
}

#[test]
fn test_concurrent_reissue_mints_one_successor() {
    const WORKERS: usize = 4;

    let h = harness();
    let mut client = Client::default();
    client.request(&h.manager, true, |s| s.set("k", 1).unwrap());
    let original = client.token();
    h.clock.set(61);

    let barrier = Arc::new(Barrier::new(WORKERS));
    let tokens: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let original = original.clone();
                let manager = &h.manager;
                scope.spawn(move || {
                    barrier.wait();
                    let mut worker = Client::holding(&original);
                    worker.request(manager, true, |s| {
                        s.token().cloned().unwrap().into_inner()
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert!(tokens.iter().all(|t| *t == tokens[0]));
    assert_ne!(tokens[0], original);
    assert_eq!(h.manager.store().list_all_keys().unwrap().len(), 2);
}
