#![allow(non_snake_case)]

use alloy::primitives::{
    B256,
    U256,
};
use generated_abi::{
    GameCall,
    test_helpers::ether,
};
use stardrop::{
    error::{
        Precondition,
        TransactionFailure,
        WalletError,
    },
    ledger::TxReceipt,
    orchestrator::{
        Action,
        DropOrchestrator,
        GameEvent,
    },
    session::{
        Approval,
        WalletKind,
        WalletSession,
    },
    test_helpers::{
        FakeConnector,
        PASSWORD,
        RecordingObserver,
    },
};

type Game = DropOrchestrator<FakeConnector, RecordingObserver>;

async fn connected_game(balance: U256, tickets: u64) -> (Game, FakeConnector, RecordingObserver) {
    let connector = FakeConnector::new(balance, tickets);
    let observer = RecordingObserver::default();
    let game = DropOrchestrator::new(WalletSession::new(connector.clone()), observer.clone());
    let connected = game
        .connect(
            WalletKind::DirectSigner,
            Approval::Granted {
                password: PASSWORD.to_string(),
            },
        )
        .await;
    assert!(connected);
    (game, connector, observer)
}

#[tokio::test]
async fn mint__insufficient_tickets_sends_nothing() {
    // given
    let (game, connector, observer) = connected_game(ether("1"), 3).await;

    // when
    let minted = game.mint(1, 5).await;

    // then
    assert!(!minted);
    assert_eq!(connector.ledger().submit_count(), 0);
    assert_eq!(
        observer.events().last(),
        Some(&GameEvent::ActionFailed {
            action: Action::Mint,
            error: WalletError::Precondition(Precondition::InsufficientTickets {
                need: 5,
                have: 3,
            }),
        })
    );
}

#[tokio::test]
async fn mint__spends_tickets_and_refreshes() {
    // given
    let (game, connector, observer) = connected_game(ether("1"), 10).await;
    let ledger = connector.ledger();
    let hash = B256::repeat_byte(0x07);
    ledger.push_receipt(Ok(TxReceipt::success(hash, Vec::new())));
    ledger.set_after_submit(ether("0.99"), 5);

    // when
    let minted = game.mint(2, 5).await;

    // then
    assert!(minted);
    assert_eq!(
        ledger.submitted(),
        vec![GameCall::MintNft {
            toy_id: U256::from(2)
        }]
    );
    assert!(observer.events().contains(&GameEvent::ToyMinted {
        toy_id: 2,
        tx_hash: hash
    }));
    let account = game.session().account().unwrap();
    assert_eq!(account.tickets, 5);
    assert_eq!(account.balance, ether("0.99"));
}

#[tokio::test]
async fn mint__reverted_call_keeps_tickets() {
    let (game, connector, _observer) = connected_game(ether("1"), 10).await;
    connector
        .ledger()
        .push_receipt(Ok(TxReceipt::reverted(B256::repeat_byte(0x08))));

    let minted = game.mint(3, 10).await;

    assert!(!minted);
    assert_eq!(game.session().account().unwrap().tickets, 10);
}

#[tokio::test]
async fn settle__submits_amount_and_reports_hash() {
    // given
    let (game, connector, observer) = connected_game(ether("1"), 4).await;
    let ledger = connector.ledger();
    ledger.set_after_submit(ether("5"), 0);

    // when
    let settled = game.settle(4).await;

    // then
    assert!(settled);
    assert_eq!(
        ledger.submitted(),
        vec![GameCall::SettleTickets {
            amount: U256::from(4)
        }]
    );
    assert!(observer.events().contains(&GameEvent::TicketsSettled {
        amount: 4,
        tx_hash: B256::repeat_byte(0x01),
    }));
    let account = game.session().account().unwrap();
    assert_eq!(account.tickets, 0);
    assert_eq!(account.balance, ether("5"));
}

#[tokio::test]
async fn settle__zero_tickets_is_refused_locally() {
    let (game, connector, observer) = connected_game(ether("1"), 4).await;

    let settled = game.settle(0).await;

    assert!(!settled);
    assert_eq!(connector.ledger().submit_count(), 0);
    assert!(matches!(
        observer.events().last(),
        Some(GameEvent::ActionFailed {
            action: Action::Settle,
            error: WalletError::Precondition(Precondition::ZeroTickets),
        })
    ));
}

#[tokio::test]
async fn settle__network_failure_is_reported() {
    let (game, connector, observer) = connected_game(ether("1"), 4).await;
    connector
        .ledger()
        .push_receipt(Err(TransactionFailure::network("connection reset")));

    let settled = game.settle(2).await;

    assert!(!settled);
    assert!(matches!(
        observer.events().last(),
        Some(GameEvent::ActionFailed {
            action: Action::Settle,
            error: WalletError::Transaction(TransactionFailure::Network(_)),
        })
    ));
}
