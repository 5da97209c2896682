//! Marketplace use-case service.
//!
//! # Responsibility
//! - Compose repository calls into the platform's offer and search flows.
//! - Declare a transaction scope per use case so every nested repository
//!   call inherits the right route.
//!
//! # Invariants
//! - Every use case takes the caller's strategy; the service never picks a
//!   backend on its own.
//! - Search results only contain published offers and never exceed the
//!   request's `max_results`.

use crate::error::DataError;
use crate::model::account::Account;
use crate::model::external_service::ExternalService;
use crate::model::offer::Offer;
use crate::model::search_request::SearchRequest;
use crate::repo::Criteria;
use crate::routing::{intercept, RouteContext, TransactionDescriptor};
use crate::selector::{BackendSelector, StrategyToken};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for marketplace use cases.
#[derive(Debug)]
pub enum MarketplaceError {
    /// Offer references an account that does not exist under the strategy.
    AccountNotFound(String),
    /// Persistence-layer failure.
    Data(DataError),
}

impl Display for MarketplaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::Data(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MarketplaceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Data(err) => Some(err),
            Self::AccountNotFound(_) => None,
        }
    }
}

impl From<DataError> for MarketplaceError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

/// Marketplace facade over the backend selector.
pub struct MarketplaceService {
    selector: BackendSelector,
}

impl MarketplaceService {
    pub fn new(selector: BackendSelector) -> Self {
        Self { selector }
    }

    /// Publishes an offer owned by an existing account.
    ///
    /// The owner lookup runs as a nested read-only step; the offer write
    /// after it still goes to the primary.
    pub fn publish_offer(
        &self,
        ctx: &mut RouteContext,
        strategy: StrategyToken,
        offer: Offer,
    ) -> MarketplaceResult<Offer> {
        let accounts = self.selector.repository::<Account>(strategy);
        let offers = self.selector.repository::<Offer>(strategy);

        intercept(ctx, TransactionDescriptor::read_write("publish_offer"), |ctx| {
            if accounts.find_by_id(ctx, &offer.account_id)?.is_none() {
                return Err(MarketplaceError::AccountNotFound(offer.account_id.clone()));
            }

            let mut offer = offer;
            offer.published = true;
            let saved = offers.save(ctx, &offer)?;
            info!(
                "event=offer_publish module=service status=ok strategy={} offer_id={}",
                strategy, saved.id
            );
            Ok(saved)
        })
    }

    /// Deletes every offer of one account and returns how many were removed.
    pub fn withdraw_account_offers(
        &self,
        ctx: &mut RouteContext,
        strategy: StrategyToken,
        account_id: &str,
    ) -> MarketplaceResult<u64> {
        let offers = self.selector.repository::<Offer>(strategy);
        let removed = intercept(
            ctx,
            TransactionDescriptor::read_write("withdraw_account_offers"),
            |ctx| offers.delete_by(ctx, &Criteria::all().field_eq("account_id", account_id)),
        )?;
        info!(
            "event=offer_withdraw module=service status=ok strategy={} removed={}",
            strategy, removed
        );
        Ok(removed)
    }

    /// Persists the search request, then returns published offers whose
    /// title contains the query, ignoring case.
    pub fn record_search(
        &self,
        ctx: &mut RouteContext,
        strategy: StrategyToken,
        request: SearchRequest,
    ) -> MarketplaceResult<Vec<Offer>> {
        let searches = self.selector.repository::<SearchRequest>(strategy);
        let offers = self.selector.repository::<Offer>(strategy);

        intercept(ctx, TransactionDescriptor::read_write("record_search"), |ctx| {
            let request = searches.save(ctx, &request)?;
            let needle = request.query.trim().to_lowercase();
            let hits: Vec<Offer> = offers
                .find_all(ctx, &Criteria::all().field_eq("published", true))?
                .into_iter()
                .filter(|offer| offer.title.to_lowercase().contains(&needle))
                .take(request.max_results as usize)
                .collect();
            info!(
                "event=search_record module=service status=ok strategy={} hits={}",
                strategy,
                hits.len()
            );
            Ok(hits)
        })
    }

    pub fn register_external_service(
        &self,
        ctx: &mut RouteContext,
        strategy: StrategyToken,
        service: ExternalService,
    ) -> MarketplaceResult<ExternalService> {
        let services = self.selector.repository::<ExternalService>(strategy);
        Ok(intercept(
            ctx,
            TransactionDescriptor::read_write("register_external_service"),
            |ctx| services.save(ctx, &service),
        )?)
    }
}
