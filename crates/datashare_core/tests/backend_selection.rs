use datashare_core::db::pool::{ConnectionPool, PoolConfig};
use datashare_core::db::{open_db, AccessMode, StoreLocation};
use datashare_core::ledger::{InMemoryLedger, LedgerReceipt, LedgerResult};
use datashare_core::{
    Account, BackendSelector, ConnectionRouter, Criteria, DataError, ExternalService,
    LedgerClient, LedgerError, Offer, RepositoryBinding, RepositoryKind, ReplicaPolicy, Route, RouteContext,
    SearchRequest, StrategyToken,
};
use std::path::Path;
use std::sync::Arc;
use serde_json::json;
use std::time::Duration;

struct Fixture {
    _dir: tempfile::TempDir,
    ledger: Arc<InMemoryLedger>,
    selector: BackendSelector,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let router = router_at(dir.path());
    let ledger = Arc::new(InMemoryLedger::new(
        "http://ledger.test:7051",
        Duration::from_secs(1),
    ));
    let client: Arc<dyn LedgerClient> = ledger.clone();
    Fixture {
        selector: BackendSelector::new(router, client),
        ledger,
        _dir: dir,
    }
}

fn router_at(dir: &Path) -> Arc<ConnectionRouter> {
    let location = StoreLocation::File(dir.join("datashare.db"));
    let pool = |name: &str, access| {
        ConnectionPool::open(PoolConfig {
            name: name.to_string(),
            location: location.clone(),
            access,
            size: 2,
            acquire_timeout: Duration::from_millis(500),
        })
        .unwrap()
    };
    let primary = pool("primary", AccessMode::ReadWrite);
    let replica = pool("replica", AccessMode::ReadOnly);
    Arc::new(
        ConnectionRouter::new(
            [(Route::Primary, primary), (Route::Replica, replica)],
            ReplicaPolicy::FallbackToPrimary,
        )
        .unwrap(),
    )
}

#[test]
fn every_kind_resolves_under_every_strategy() {
    let fx = fixture();
    for kind in RepositoryKind::ALL {
        for strategy in StrategyToken::ALL {
            let binding = fx.selector.bind(kind, strategy);
            assert_eq!(binding.kind(), kind, "{kind} under {strategy}");

            let by_name = fx
                .selector
                .resolve(kind.as_str(), Some(strategy.as_str()))
                .unwrap();
            assert_eq!(by_name.kind(), kind);
        }
    }
}

#[test]
fn unsupported_strategy_is_rejected_not_defaulted() {
    let fx = fixture();
    let err = fx
        .selector
        .resolve("account", Some("blockchain"))
        .err()
        .unwrap();
    assert!(matches!(err, DataError::UnsupportedStrategy(ref value) if value == "blockchain"));

    let err = fx
        .selector
        .resolve_for::<Offer>(Some("nosql"))
        .err()
        .unwrap();
    assert!(matches!(err, DataError::UnsupportedStrategy(_)));
}

#[test]
fn unknown_kind_is_rejected() {
    let fx = fixture();
    let err = fx.selector.resolve("invoice", None).err().unwrap();
    assert!(matches!(err, DataError::UnknownRepositoryKind(ref value) if value == "invoice"));
}

#[test]
fn absent_indicator_resolves_relational() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let account = Account::new("ada@example.org", "Ada");

    let repo = fx.selector.resolve_for::<Account>(None).unwrap();
    repo.save(&mut ctx, &account).unwrap();

    let relational = fx.selector.repository::<Account>(StrategyToken::Relational);
    assert_eq!(
        relational.find_by_id(&mut ctx, &account.id).unwrap(),
        Some(account.clone())
    );
    assert_eq!(fx.ledger.height().unwrap(), 0);
}

#[test]
fn ledger_write_is_invisible_to_relational_backend() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let service = ExternalService::new("k1", "Weather feed", "https://weather.example.org/v1");

    let ledger_repo = fx.selector.repository::<ExternalService>(StrategyToken::Ledger);
    let relational_repo = fx
        .selector
        .repository::<ExternalService>(StrategyToken::Relational);

    ledger_repo.save(&mut ctx, &service).unwrap();

    assert_eq!(
        ledger_repo.find_by_id(&mut ctx, "k1").unwrap(),
        Some(service.clone())
    );
    assert_eq!(relational_repo.find_by_id(&mut ctx, "k1").unwrap(), None);
    assert_eq!(ctx.current(), Route::Primary);
}

#[test]
fn backends_hold_independent_values_for_the_same_key() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let on_ledger = ExternalService::new("k2", "Ledger copy", "https://a.example.org");
    let on_sql = ExternalService::new("k2", "Relational copy", "https://b.example.org");

    let RepositoryBinding::ExternalService(ledger_repo) =
        fx.selector.resolve("external_service", Some("ledger")).unwrap()
    else {
        panic!("expected external service binding");
    };
    let RepositoryBinding::ExternalService(sql_repo) =
        fx.selector.resolve("ExternalService", Some("relational")).unwrap()
    else {
        panic!("expected external service binding");
    };

    ledger_repo.save(&mut ctx, &on_ledger).unwrap();
    sql_repo.save(&mut ctx, &on_sql).unwrap();

    assert_eq!(ledger_repo.find_by_id(&mut ctx, "k2").unwrap(), Some(on_ledger));
    assert_eq!(sql_repo.find_by_id(&mut ctx, "k2").unwrap(), Some(on_sql));
}

#[test]
fn ledger_find_all_and_delete_by_follow_criteria() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let repo = fx.selector.repository::<Offer>(StrategyToken::Ledger);

    let mut offers = Vec::new();
    for (idx, account) in ["acc-a", "acc-a", "acc-b"].into_iter().enumerate() {
        let mut offer = Offer::new(account, format!("dataset {idx}"), 100 * idx as i64);
        offer.id = format!("offer-{idx}");
        offers.push(repo.save(&mut ctx, &offer).unwrap());
    }

    let owned = repo
        .find_all(&mut ctx, &Criteria::all().field_eq("account_id", "acc-a"))
        .unwrap();
    assert_eq!(owned, offers[..2].to_vec());

    let page = repo
        .find_all(&mut ctx, &Criteria::all().offset(1).limit(1))
        .unwrap();
    assert_eq!(page, vec![offers[1].clone()]);

    let removed = repo
        .delete_by(&mut ctx, &Criteria::all().field_eq("account_id", "acc-a"))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(repo.find_by_id(&mut ctx, "offer-0").unwrap(), None);
    assert_eq!(
        repo.find_all(&mut ctx, &Criteria::all()).unwrap(),
        vec![offers[2].clone()]
    );

    // Deletion appends tombstones; history is kept.
    let history = fx.ledger.history(RepositoryKind::Offer.namespace(), "offer-0").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].payload.is_none());
}

#[test]
fn invalid_records_are_rejected_by_both_backends() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let bad = SearchRequest::new("acc-a", "rain", 0);

    for strategy in StrategyToken::ALL {
        let repo = fx.selector.repository::<SearchRequest>(strategy);
        let err = repo.save(&mut ctx, &bad).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord(_)), "{strategy}: {err}");
    }
    assert_eq!(fx.ledger.height().unwrap(), 0);
}

#[test]
fn ledger_timeout_surfaces_as_transport_failure() {
    struct DownLedger;

    impl LedgerClient for DownLedger {
        fn endpoint(&self) -> &str {
            "http://down.test"
        }
        fn put(&self, _: &str, _: &str, _: &[u8]) -> LedgerResult<LedgerReceipt> {
            Err(LedgerError::Timeout(Duration::from_millis(5)))
        }
        fn get(&self, _: &str, _: &str) -> LedgerResult<Option<Vec<u8>>> {
            Err(LedgerError::Unreachable("http://down.test".to_string()))
        }
        fn scan(&self, _: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
            Err(LedgerError::Unreachable("http://down.test".to_string()))
        }
        fn remove(&self, _: &str, _: &str) -> LedgerResult<Option<LedgerReceipt>> {
            Err(LedgerError::Unreachable("http://down.test".to_string()))
        }
        fn height(&self) -> LedgerResult<u64> {
            Ok(0)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let selector = BackendSelector::new(router_at(dir.path()), Arc::new(DownLedger));
    let repo = selector.repository::<Account>(StrategyToken::Ledger);
    let mut ctx = RouteContext::new();

    let err = repo
        .save(&mut ctx, &Account::new("ada@example.org", "Ada"))
        .unwrap_err();
    assert!(matches!(err, DataError::TransportFailure { backend: "ledger", .. }));

    let err = repo.find_by_id(&mut ctx, "missing").unwrap_err();
    assert!(matches!(err, DataError::TransportFailure { backend: "ledger", .. }));
}

#[test]
fn criteria_match_the_same_records_on_both_backends() {
    let fx = fixture();
    let mut ctx = RouteContext::new();
    let mut offer = Offer::new("acc-a", "tide gauges", 1);
    offer.published = true;

    let cases = [
        ("published", json!(1), 0),
        ("price_cents", json!(true), 0),
        ("published", json!("true"), 0),
        ("price_cents", json!("1"), 0),
        ("published", json!(true), 1),
        ("price_cents", json!(1), 1),
        ("price_cents", json!(1.0), 1),
        ("title", json!("tide gauges"), 1),
    ];
    for strategy in StrategyToken::ALL {
        let repo = fx.selector.repository::<Offer>(strategy);
        repo.save(&mut ctx, &offer).unwrap();
        for (field, value, expected) in &cases {
            let found = repo
                .find_all(&mut ctx, &Criteria::all().field_eq(*field, value.clone()))
                .unwrap();
            assert_eq!(found.len(), *expected, "{strategy}: {field}=={value}");
        }
    }
}

#[test]
fn refused_deletes_are_data_not_saved_on_both_backends() {
    struct RetentionLedger(InMemoryLedger);

    impl LedgerClient for RetentionLedger {
        fn endpoint(&self) -> &str {
            self.0.endpoint()
        }
        fn put(&self, namespace: &str, key: &str, payload: &[u8]) -> LedgerResult<LedgerReceipt> {
            self.0.put(namespace, key, payload)
        }
        fn get(&self, namespace: &str, key: &str) -> LedgerResult<Option<Vec<u8>>> {
            self.0.get(namespace, key)
        }
        fn scan(&self, namespace: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
            self.0.scan(namespace)
        }
        fn remove(&self, _: &str, _: &str) -> LedgerResult<Option<LedgerReceipt>> {
            Err(LedgerError::Rejected("retention hold".to_string()))
        }
        fn height(&self) -> LedgerResult<u64> {
            self.0.height()
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let router = router_at(dir.path());
    open_db(dir.path().join("datashare.db"))
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER offers_retention BEFORE DELETE ON offers
             BEGIN SELECT RAISE(ABORT, 'retention hold'); END;",
        )
        .unwrap();
    let ledger = RetentionLedger(InMemoryLedger::new(
        "http://ledger.test:7051",
        Duration::from_secs(1),
    ));
    let selector = BackendSelector::new(router, Arc::new(ledger));
    let mut ctx = RouteContext::new();
    let offer = Offer::new("acc-a", "river levels", 200);
    let criteria = Criteria::all().field_eq("account_id", "acc-a");

    for strategy in StrategyToken::ALL {
        let repo = selector.repository::<Offer>(strategy);
        repo.save(&mut ctx, &offer).unwrap();

        let err = repo.delete_by(&mut ctx, &criteria).unwrap_err();
        assert!(
            matches!(
                err,
                DataError::DataNotSaved { kind: RepositoryKind::Offer, ref reason, .. }
                    if reason.contains("retention hold")
            ),
            "{strategy}: {err}"
        );
        assert_eq!(repo.find_all(&mut ctx, &criteria).unwrap(), vec![offer.clone()]);
    }
}
