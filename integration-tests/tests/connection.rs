#![allow(non_snake_case)]

use alloy::primitives::U256;
use generated_abi::test_helpers::{
    TEST_PLAYER,
    ether,
};
use stardrop::{
    error::{
        ConnectionFailure,
        Precondition,
        ReadFailure,
        WalletError,
    },
    orchestrator::{
        Action,
        DropOrchestrator,
        GameEvent,
    },
    session::{
        Approval,
        BalanceDelta,
        Credential,
        SessionState,
        WalletKind,
        WalletSession,
    },
    test_helpers::{
        FakeConnector,
        FakeLedger,
        PASSWORD,
        RecordingObserver,
        drop_receipt,
    },
};

fn granted() -> Approval {
    Approval::Granted {
        password: PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn connect__unavailable_provider_reports_connection_failure() {
    // given
    let observer = RecordingObserver::default();
    let game = DropOrchestrator::new(
        WalletSession::new(FakeConnector::unavailable()),
        observer.clone(),
    );

    // when
    let connected = game.connect(WalletKind::SessionDelegated, granted()).await;

    // then
    assert!(!connected);
    assert_eq!(game.session().state(), SessionState::Disconnected);
    assert!(!game.can_drop());
    assert_eq!(
        observer.events(),
        vec![
            GameEvent::Connecting(WalletKind::SessionDelegated),
            GameEvent::ActionFailed {
                action: Action::Connect,
                error: WalletError::Connection(ConnectionFailure::unavailable(
                    "no keystore found"
                )),
            },
        ]
    );
}

#[tokio::test]
async fn connect__wrong_password_is_a_rejection() {
    let session = WalletSession::new(FakeConnector::new(ether("1"), 0));

    let result = session
        .connect(
            WalletKind::DirectSigner,
            Approval::Granted {
                password: "wrong".into(),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(WalletError::Connection(ConnectionFailure::Rejected(_)))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn connect__delegated_and_direct_credentials() {
    let connector = FakeConnector::new(ether("2"), 7);
    let session = WalletSession::new(connector.clone());

    let delegated = session
        .connect(WalletKind::SessionDelegated, granted())
        .await
        .unwrap();
    session.disconnect();
    let direct = session
        .connect(WalletKind::DirectSigner, granted())
        .await
        .unwrap();

    assert!(matches!(delegated.credential, Credential::Delegated(_)));
    assert_eq!(
        direct.credential,
        Credential::Direct {
            signer: TEST_PLAYER
        }
    );
    assert_eq!(direct.balance, ether("2"));
    assert_eq!(direct.tickets, 7);
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn connect__failed_balance_read_leaves_session_disconnected() {
    let connector = FakeConnector::new(ether("1"), 0);
    connector
        .ledger()
        .fail_reads(ReadFailure::Balance("rpc down".into()));
    let session = WalletSession::new(connector);

    let result = session.connect(WalletKind::DirectSigner, granted()).await;

    assert_eq!(
        result,
        Err(WalletError::Connection(ConnectionFailure::InitialRead(
            ReadFailure::Balance("rpc down".into())
        )))
    );
    assert!(!session.has_credential());
}

#[tokio::test]
async fn disconnect__clears_account_and_blocks_drops() {
    let connector = FakeConnector::new(ether("1"), 0);
    let ledger = connector.ledger();
    let observer = RecordingObserver::default();
    let game = DropOrchestrator::new(WalletSession::new(connector), observer.clone());
    game.connect(WalletKind::DirectSigner, granted()).await;

    game.disconnect();

    assert_eq!(game.session().account(), None);
    assert!(!game.can_drop());
    assert_eq!(observer.events().last(), Some(&GameEvent::Disconnected));
    assert_eq!(ledger.submit_count(), 0);
}

#[tokio::test]
async fn apply_optimistic__result_from_previous_connection_is_discarded() {
    // given
    let ledger = FakeLedger::new(TEST_PLAYER, ether("1"), 0).gated();
    ledger.push_receipt(Ok(drop_receipt(ether("0.5"), U256::from(3), ether("1.5"))));
    let session = WalletSession::new(FakeConnector::with_ledger(ledger.clone()));
    session
        .connect(WalletKind::DirectSigner, granted())
        .await
        .unwrap();
    let old_epoch = session.epoch().unwrap();

    // when
    let (result, _) = tokio::join!(session.drop_ball(ether("0.5")), async {
        session.disconnect();
        session
            .connect(WalletKind::DirectSigner, granted())
            .await
            .unwrap();
        ledger.release();
    });
    let result = result.unwrap();
    let applied = session.apply_optimistic(old_epoch, BalanceDelta::for_drop(&result));

    // then
    assert!(!applied);
    let account = session.account().unwrap();
    assert_eq!(account.balance, ether("1"));
    assert_eq!(account.tickets, 0);
    assert_ne!(session.epoch(), Some(old_epoch));
}

#[tokio::test]
async fn refresh_balances__overwrites_optimistic_values() {
    let connector = FakeConnector::new(ether("1"), 2);
    let ledger = connector.ledger();
    let session = WalletSession::new(connector);
    session
        .connect(WalletKind::DirectSigner, granted())
        .await
        .unwrap();
    let epoch = session.epoch().unwrap();
    session.apply_optimistic(epoch, BalanceDelta::for_mint(2));
    ledger.set_balances(ether("0.9"), 1);

    let balances = session.refresh_balances().await.unwrap();

    assert_eq!(balances.balance, ether("0.9"));
    let account = session.account().unwrap();
    assert_eq!(account.balance, ether("0.9"));
    assert_eq!(account.tickets, 1);
}

#[tokio::test]
async fn refresh_balances__older_refresh_landing_last_is_discarded() {
    // given
    let connector = FakeConnector::new(ether("1"), 0);
    let ledger = connector.ledger();
    let session = WalletSession::new(connector);
    session
        .connect(WalletKind::DirectSigner, granted())
        .await
        .unwrap();
    ledger.hold_reads(true);

    // when
    let (older, newer) = tokio::join!(session.refresh_balances(), async {
        ledger.set_balances(ether("2"), 5);
        let (newer, ()) = tokio::join!(session.refresh_balances(), async {
            ledger.release_read(1);
        });
        ledger.release_read(0);
        newer
    });

    // then
    assert_eq!(older.unwrap().balance, ether("1"));
    assert_eq!(newer.unwrap().balance, ether("2"));
    let account = session.account().unwrap();
    assert_eq!(account.balance, ether("2"));
    assert_eq!(account.tickets, 5);
}

#[tokio::test]
async fn refresh_balances__result_from_previous_connection_is_discarded() {
    // given
    let connector = FakeConnector::new(ether("1"), 0);
    let ledger = connector.ledger();
    let session = WalletSession::new(connector);
    session
        .connect(WalletKind::DirectSigner, granted())
        .await
        .unwrap();
    ledger.hold_reads(true);

    // when
    let (stale, ()) = tokio::join!(session.refresh_balances(), async {
        ledger.hold_reads(false);
        session.disconnect();
        ledger.set_balances(ether("3"), 9);
        session
            .connect(WalletKind::DirectSigner, granted())
            .await
            .unwrap();
        ledger.release_read(0);
    });

    // then
    assert_eq!(stale.unwrap().balance, ether("1"));
    let account = session.account().unwrap();
    assert_eq!(account.balance, ether("3"));
    assert_eq!(account.tickets, 9);
}

#[tokio::test]
async fn connect__failed_reconnect_attempt_keeps_live_session() {
    let observer = RecordingObserver::default();
    let game = DropOrchestrator::new(
        WalletSession::new(FakeConnector::new(ether("1"), 4)),
        observer.clone(),
    );
    assert!(game.connect(WalletKind::DirectSigner, granted()).await);

    let connected = game
        .connect(
            WalletKind::SessionDelegated,
            Approval::Granted {
                password: "typo".into(),
            },
        )
        .await;

    assert!(!connected);
    assert!(game.can_drop());
    assert_eq!(game.session().account().unwrap().tickets, 4);
    assert!(matches!(
        observer.events().last(),
        Some(GameEvent::ActionFailed {
            action: Action::Connect,
            error: WalletError::Precondition(Precondition::AlreadyConnected),
        })
    ));
}
