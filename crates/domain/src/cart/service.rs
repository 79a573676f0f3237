//! Cart service: load-mutate-save over carts keyed by owner email.

use std::sync::Arc;

use common::{Actor, ProductId};
use document_store::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::DomainError;
use crate::repository::{Loaded, Repository};
use crate::settings::MarketSettings;

use super::aggregate::normalize_email;
use super::{AddOutcome, Cart, CartItem, CartOperation, MergeCandidate, MergePreview};

/// One entry of an add-multiple request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAddition {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// An entry of an add-multiple request that could not be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionFailure {
    pub product_id: ProductId,
    pub error: String,
}

/// Outcome of an add-multiple request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddMultipleReport {
    pub added: usize,
    pub merged: usize,
    pub failed: Vec<AdditionFailure>,
}

/// Service for managing carts.
///
/// Carts are created lazily the first time they are read or written and are
/// never deleted; clearing empties them in place.
pub struct CartService<S> {
    carts: Repository<S, Cart>,
    catalog: Catalog<S>,
    settings: Arc<MarketSettings>,
}

impl<S: Clone> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            carts: self.carts.clone(),
            catalog: self.catalog.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: DocumentStore + Clone> CartService<S> {
    /// Creates a new cart service with the given store.
    pub fn new(store: S, settings: Arc<MarketSettings>) -> Self {
        Self {
            carts: Repository::new(store.clone()),
            catalog: Catalog::new(store, Arc::clone(&settings)),
            settings,
        }
    }

    /// Returns the cart for `email`, creating an empty one if needed.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn get_cart(&self, actor: &Actor, email: &str) -> Result<Cart, DomainError> {
        let key = authorize(actor, email)?;
        Ok(self.load_or_create(actor, &key).await?.entity)
    }

    /// Adds a product to the cart, merging with an existing line.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        email: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(Cart, AddOutcome), DomainError> {
        let key = authorize(actor, email)?;
        let product = self.catalog.get_product(product_id).await?;
        product.ensure_purchasable(quantity)?;

        let line = CartItem::from_product(&product, quantity);
        let delivery = self.settings.fees.delivery_charge;
        let (cart, outcome) = self
            .mutate(actor, &key, |cart| Ok(cart.add_line(line, delivery)?))
            .await?;

        record_addition(outcome);
        Ok((cart, outcome))
    }

    /// Adds several products at once; entries that fail are reported, not fatal.
    #[tracing::instrument(skip(self, actor, additions), fields(actor = %actor.id, count = additions.len()))]
    pub async fn add_multiple(
        &self,
        actor: &Actor,
        email: &str,
        additions: &[CartAddition],
    ) -> Result<(Cart, AddMultipleReport), DomainError> {
        let key = authorize(actor, email)?;

        let mut report = AddMultipleReport::default();
        let mut lines = Vec::with_capacity(additions.len());
        for addition in additions {
            let checked = match self.catalog.get_product(addition.product_id).await {
                Ok(product) => product
                    .ensure_purchasable(addition.quantity)
                    .map(|()| CartItem::from_product(&product, addition.quantity))
                    .map_err(DomainError::from),
                Err(e) => Err(e),
            };
            match checked {
                Ok(line) => lines.push(line),
                Err(e) => report.failed.push(AdditionFailure {
                    product_id: addition.product_id,
                    error: e.to_string(),
                }),
            }
        }

        if lines.is_empty() {
            let cart = self.load_or_create(actor, &key).await?.entity;
            return Ok((cart, report));
        }

        let delivery = self.settings.fees.delivery_charge;
        let (cart, outcomes) = self
            .mutate(actor, &key, |cart| {
                Ok(lines
                    .into_iter()
                    .map(|line| (line.product_id, cart.add_line(line, delivery)))
                    .collect::<Vec<_>>())
            })
            .await?;

        for (product_id, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    record_addition(outcome);
                    match outcome {
                        AddOutcome::Added => report.added += 1,
                        AddOutcome::Merged { .. } => report.merged += 1,
                    }
                }
                Err(e) => report.failed.push(AdditionFailure {
                    product_id,
                    error: e.to_string(),
                }),
            }
        }
        Ok((cart, report))
    }

    /// Overwrites the quantity of an existing line.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn update_quantity(
        &self,
        actor: &Actor,
        email: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        let key = authorize(actor, email)?;
        let (cart, ()) = self
            .mutate(actor, &key, |cart| {
                Ok(cart.update_quantity(product_id, quantity)?)
            })
            .await?;
        Ok(cart)
    }

    /// Removes a line; removing an absent line is not an error.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn remove_item(
        &self,
        actor: &Actor,
        email: &str,
        product_id: ProductId,
    ) -> Result<Cart, DomainError> {
        let key = authorize(actor, email)?;
        let (cart, removed) = self
            .mutate(actor, &key, |cart| Ok(cart.remove_item(product_id)))
            .await?;
        if !removed {
            tracing::debug!(%product_id, "remove of absent cart line");
        }
        Ok(cart)
    }

    /// Empties the cart.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn clear(&self, actor: &Actor, email: &str) -> Result<Cart, DomainError> {
        let key = authorize(actor, email)?;
        let (cart, ()) = self
            .mutate(actor, &key, |cart| {
                cart.clear();
                Ok(())
            })
            .await?;
        Ok(cart)
    }

    /// Applies a batch of update/remove operations, skipping invalid ones.
    #[tracing::instrument(skip(self, actor, operations), fields(actor = %actor.id, count = operations.len()))]
    pub async fn batch_apply(
        &self,
        actor: &Actor,
        email: &str,
        operations: &[CartOperation],
    ) -> Result<(Cart, usize), DomainError> {
        let key = authorize(actor, email)?;
        self.mutate(actor, &key, |cart| Ok(cart.batch_apply(operations)))
            .await
    }

    /// Projects a merge without touching the stored cart.
    #[tracing::instrument(skip(self, actor, candidates), fields(actor = %actor.id))]
    pub async fn preview_merge(
        &self,
        actor: &Actor,
        email: &str,
        candidates: &[MergeCandidate],
    ) -> Result<MergePreview, DomainError> {
        let key = authorize(actor, email)?;
        let cart = match self.carts.load(&key).await? {
            Some(loaded) => loaded.entity,
            None => Cart::new(&key, None),
        };
        Ok(cart.preview_merge(candidates))
    }

    async fn load_or_create(&self, actor: &Actor, key: &str) -> Result<Loaded<Cart>, DomainError> {
        if let Some(loaded) = self.carts.load(key).await? {
            return Ok(loaded);
        }

        let owner_id = (normalize_email(&actor.email) == key).then(|| actor.id.clone());
        match self.carts.insert(Cart::new(key, owner_id)).await {
            Ok(loaded) => Ok(loaded),
            // Another request created it first.
            Err(DomainError::Store(StoreError::AlreadyExists { .. })) => {
                self.carts.load_required(key).await
            }
            Err(e) => Err(e),
        }
    }

    async fn mutate<F, R>(&self, actor: &Actor, key: &str, apply: F) -> Result<(Cart, R), DomainError>
    where
        F: FnOnce(&mut Cart) -> Result<R, DomainError>,
    {
        let mut loaded = self.load_or_create(actor, key).await?;
        let outcome = apply(&mut loaded.entity)?;
        self.carts.save(&loaded.entity, loaded.version).await?;
        Ok((loaded.entity, outcome))
    }
}

/// Only the owner (by email) or an admin may touch a cart.
fn authorize(actor: &Actor, email: &str) -> Result<String, DomainError> {
    if email.trim().is_empty() {
        return Err(DomainError::InvalidInput("email is required".into()));
    }
    if !actor.can_access_email(email.trim()) {
        return Err(DomainError::Unauthorized(
            "cannot access another user's cart".into(),
        ));
    }
    Ok(normalize_email(email))
}

fn record_addition(outcome: AddOutcome) {
    let outcome = match outcome {
        AddOutcome::Added => "added",
        AddOutcome::Merged { .. } => "merged",
    };
    metrics::counter!("cart_items_added_total", "outcome" => outcome).increment(1);
}
