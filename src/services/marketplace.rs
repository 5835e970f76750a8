use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{load_user, timestamped_slug};
use crate::error::{ShopError, ShopResult};
use crate::mailer::Email;
use crate::pricing::{apply_discount_voucher, marketplace_price, round_up};
use crate::state::AppState;
use crate::store::{ProductQuery, StoreError};
use crate::types::{
    DeliveryType, Product, PublicProfile, Purchase, Review, User, Voucher, VoucherKind,
};

const PURCHASE_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub delivery_type: Option<DeliveryType>,
    #[serde(default)]
    pub delivery_content: Option<String>,
}

impl ProductInput {
    fn validate(&self) -> ShopResult<()> {
        if self.name.trim().is_empty() {
            return Err(ShopError::InvalidInput("name is required".to_string()));
        }
        if self.price <= 0 {
            return Err(ShopError::InvalidInput("price must be positive".to_string()));
        }
        if self.delivery_type == Some(DeliveryType::Auto)
            && self
                .delivery_content
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
        {
            return Err(ShopError::InvalidInput(
                "auto delivery needs delivery content".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub seller: Option<PublicProfile>,
    /// What the viewer would pay now, before vouchers.
    pub price_for_viewer: i64,
    pub has_bought: bool,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellerStore {
    pub seller: PublicProfile,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    Auto { content: String },
    Manual { note: String, seller_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub purchase_id: Uuid,
    pub product_id: Uuid,
    pub price: i64,
    pub balance: i64,
    pub delivery: Delivery,
}

pub async fn browse(state: &AppState, query: &ProductQuery) -> ShopResult<Vec<Product>> {
    Ok(state.store.list_products(query).await?)
}

async fn product(state: &AppState, id: Uuid) -> ShopResult<Product> {
    state
        .store
        .product(id)
        .await?
        .ok_or(ShopError::NotFound("product"))
}

pub async fn detail(
    state: &AppState,
    slug: &str,
    viewer: Option<&User>,
    now: DateTime<Utc>,
) -> ShopResult<ProductDetail> {
    let product = state
        .store
        .product_by_slug(slug)
        .await?
        .ok_or(ShopError::NotFound("product"))?;
    let seller = state.store.user(product.seller_id).await?;
    let has_bought = match viewer {
        Some(v) => state.store.has_purchased(v.id, product.id).await?,
        None => false,
    };
    let rank = viewer.map(|v| v.rank).unwrap_or(crate::types::Rank::Bronze);
    Ok(ProductDetail {
        price_for_viewer: round_up(marketplace_price(&product, rank, now)),
        seller: seller.as_ref().map(PublicProfile::from),
        has_bought,
        reviews: state.store.reviews_for_product(product.id).await?,
        product,
    })
}

pub async fn seller_store(state: &AppState, username: &str) -> ShopResult<SellerStore> {
    let seller = state
        .store
        .user_by_username(username)
        .await?
        .ok_or(ShopError::NotFound("seller"))?;
    Ok(SellerStore {
        products: state.store.products_by_seller(seller.id).await?,
        seller: PublicProfile::from(&seller),
    })
}

pub async fn create_product(
    state: &AppState,
    seller: &User,
    input: ProductInput,
    now: DateTime<Utc>,
) -> ShopResult<Product> {
    if !seller.role.can_sell() {
        return Err(ShopError::Forbidden("only sellers can list products".to_string()));
    }
    input.validate()?;
    let product = Product {
        id: Uuid::new_v4(),
        seller_id: seller.id,
        slug: timestamped_slug(&input.name, now),
        name: input.name.trim().to_string(),
        description: input.description,
        price: input.price,
        category: input.category.trim().to_string(),
        image: input.image.unwrap_or_default(),
        sold: 0,
        delivery_type: input.delivery_type.unwrap_or(DeliveryType::Manual),
        delivery_content: input.delivery_content,
        average_rating: 0.0,
        flash_sale_price: 0,
        flash_sale_end: None,
        created_at: now,
        updated_at: now,
    };
    let product = state.store.create_product(product).await?;
    info!(product_id = %product.id, seller_id = %seller.id, "product listed");
    Ok(product)
}

async fn owned_product(state: &AppState, actor: &User, id: Uuid) -> ShopResult<Product> {
    let product = product(state, id).await?;
    if product.seller_id != actor.id && !actor.role.is_admin() {
        return Err(ShopError::Forbidden("not your product".to_string()));
    }
    Ok(product)
}

pub async fn update_product(
    state: &AppState,
    actor: &User,
    id: Uuid,
    input: ProductInput,
) -> ShopResult<Product> {
    input.validate()?;
    let mut product = owned_product(state, actor, id).await?;
    product.name = input.name.trim().to_string();
    product.description = input.description;
    product.price = input.price;
    product.category = input.category.trim().to_string();
    if let Some(image) = input.image {
        product.image = image;
    }
    if let Some(delivery_type) = input.delivery_type {
        product.delivery_type = delivery_type;
    }
    if input.delivery_content.is_some() {
        product.delivery_content = input.delivery_content;
    }
    Ok(state.store.update_product(&product).await?)
}

pub async fn delete_product(state: &AppState, actor: &User, id: Uuid) -> ShopResult<()> {
    owned_product(state, actor, id).await?;
    state.store.delete_product(id).await?;
    info!(product_id = %id, actor = %actor.id, "product deleted");
    Ok(())
}

/// Prices the purchase and claims the discount voucher, if any.
async fn price_with_voucher(
    state: &AppState,
    buyer: &User,
    product: &Product,
    voucher_code: Option<&str>,
    now: DateTime<Utc>,
) -> ShopResult<(i64, Option<Voucher>)> {
    let price = marketplace_price(product, buyer.rank, now);
    let Some(code) = voucher_code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok((round_up(price), None));
    };

    let voucher = state
        .store
        .voucher_by_code(&code.to_uppercase(), VoucherKind::Discount)
        .await?
        .filter(|v| v.claimable_by(buyer.id, now))
        .ok_or(ShopError::VoucherInvalid)?;
    let discounted = apply_discount_voucher(price, &voucher).ok_or_else(|| {
        ShopError::InvalidInput(format!(
            "minimum purchase for this voucher is {}",
            voucher.min_purchase
        ))
    })?;
    if !state.store.claim_voucher(voucher.id, buyer.id, now).await? {
        return Err(ShopError::VoucherInvalid);
    }
    Ok((round_up(discounted), Some(voucher)))
}

pub async fn buy(
    state: &AppState,
    buyer: &User,
    product_id: Uuid,
    voucher_code: Option<&str>,
    now: DateTime<Utc>,
) -> ShopResult<Receipt> {
    let product = product(state, product_id).await?;
    if product.seller_id == buyer.id {
        return Err(ShopError::Forbidden("you cannot buy your own product".to_string()));
    }
    let (price, voucher) = price_with_voucher(state, buyer, &product, voucher_code, now).await?;

    let purchase = Purchase {
        id: Uuid::new_v4(),
        buyer_id: buyer.id,
        product_id: product.id,
        seller_id: product.seller_id,
        price,
        delivery_content: match product.delivery_type {
            DeliveryType::Auto => product.delivery_content.clone(),
            DeliveryType::Manual => None,
        },
        status: PURCHASE_COMPLETED.to_string(),
        created_at: now,
    };
    let purchase_id = purchase.id;

    let settled = state.store.settle_purchase(purchase).await;
    let balance = match settled {
        Ok(Some(balance)) => balance,
        outcome => {
            if let Some(v) = &voucher {
                state.store.release_voucher(v.id, buyer.id).await?;
            }
            return match outcome {
                Ok(_) => {
                    let available = load_user(state, buyer.id).await?.balance;
                    Err(ShopError::InsufficientBalance {
                        required: price,
                        available,
                    })
                }
                Err(e) => Err(e.into()),
            };
        }
    };
    info!(
        %purchase_id,
        product_id = %product.id,
        buyer_id = %buyer.id,
        seller_id = %product.seller_id,
        price,
        "marketplace purchase settled"
    );

    let delivery = match (product.delivery_type, product.delivery_content) {
        (DeliveryType::Auto, Some(content)) => {
            let email = Email {
                to: buyer.email.clone(),
                subject: format!("Pesanan Anda: {}", product.name),
                html: format!("<p>Terima kasih telah membeli.</p><pre>{content}</pre>"),
            };
            if let Err(e) = state.mailer.send(email).await {
                warn!(%purchase_id, error = %e, "failed to mail delivery content");
            }
            Delivery::Auto { content }
        }
        _ => Delivery::Manual {
            note: "Silakan hubungi penjual melalui chat untuk pengiriman produk.".to_string(),
            seller_id: product.seller_id,
        },
    };

    Ok(Receipt {
        purchase_id,
        product_id: product.id,
        price,
        balance,
        delivery,
    })
}

pub async fn review(
    state: &AppState,
    user: &User,
    product_id: Uuid,
    rating: i32,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> ShopResult<Product> {
    if !(1..=5).contains(&rating) {
        return Err(ShopError::InvalidInput("rating must be between 1 and 5".to_string()));
    }
    let product = product(state, product_id).await?;
    if !state.store.has_purchased(user.id, product.id).await? {
        return Err(ShopError::Forbidden(
            "only buyers can review this product".to_string(),
        ));
    }
    let review = Review {
        id: Uuid::new_v4(),
        product_id: product.id,
        user_id: user.id,
        rating,
        comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        created_at: now,
    };
    match state.store.add_review(review).await {
        Ok(product) => Ok(product),
        Err(StoreError::Conflict(_)) => Err(ShopError::Conflict(
            "you have already reviewed this product".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn purchases(state: &AppState, buyer: &User) -> ShopResult<Vec<Purchase>> {
    Ok(state.store.purchases_for_buyer(buyer.id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProductInput {
        ProductInput {
            name: "Canva Pro".into(),
            description: "1 year".into(),
            price: 15_000,
            category: "account".into(),
            image: None,
            delivery_type: Some(DeliveryType::Auto),
            delivery_content: Some("user:pass".into()),
        }
    }

    #[test]
    fn product_input_validation() {
        assert!(input().validate().is_ok());

        let mut free = input();
        free.price = 0;
        assert!(free.validate().is_err());

        let mut empty_auto = input();
        empty_auto.delivery_content = Some("  ".into());
        assert!(empty_auto.validate().is_err());

        let mut manual = empty_auto.clone();
        manual.delivery_type = Some(DeliveryType::Manual);
        assert!(manual.validate().is_ok());
    }

    #[test]
    fn delivery_serializes_with_type_tag() {
        let json = serde_json::to_value(Delivery::Auto {
            content: "code".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "auto");
        assert_eq!(json["content"], "code");
    }
}
