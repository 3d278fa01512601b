//! Marketplace endpoints: catalog, cart, orders, addresses, reviews, seller
//! tools and the admin back office.

use serde_json::{json, Value};
use shared::{
    domain::{AddressId, CartItemId, OrderId, ProductId, ReviewId, UserId},
    protocol::ApiResponse,
};

use super::with_query;
use crate::gateway::ApiGateway;

pub async fn categories(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/categories").await
}

pub async fn hot_products(gateway: &ApiGateway, limit: u32) -> ApiResponse {
    gateway
        .get(&with_query("/products/hot", &[("limit", limit.to_string().as_str())]))
        .await
}

pub async fn new_products(gateway: &ApiGateway, limit: u32) -> ApiResponse {
    gateway
        .get(&with_query("/products/new", &[("limit", limit.to_string().as_str())]))
        .await
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub category_id: Option<i64>,
    pub keyword: Option<String>,
    pub page: Option<u32>,
}

pub async fn products(gateway: &ApiGateway, query: &ProductQuery) -> ApiResponse {
    let category = query.category_id.map(|id| id.to_string());
    let page = query.page.map(|page| page.to_string());

    let mut pairs = Vec::new();
    if let Some(category) = category.as_deref() {
        pairs.push(("category_id", category));
    }
    if let Some(keyword) = query.keyword.as_deref() {
        pairs.push(("keyword", keyword));
    }
    if let Some(page) = page.as_deref() {
        pairs.push(("page", page));
    }
    gateway.get(&with_query("/products", &pairs)).await
}

pub async fn product(gateway: &ApiGateway, id: ProductId) -> ApiResponse {
    gateway
        .get(&with_query("/product", &[("id", id.to_string().as_str())]))
        .await
}

pub async fn reviews(gateway: &ApiGateway, product: ProductId) -> ApiResponse {
    gateway
        .get(&with_query("/reviews", &[("product_id", product.to_string().as_str())]))
        .await
}

pub async fn cart(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/cart").await
}

pub async fn cart_count(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/cart/count").await
}

pub async fn add_to_cart(gateway: &ApiGateway, product: ProductId, quantity: u32) -> ApiResponse {
    gateway
        .post(
            "/cart/add",
            json!({ "product_id": product, "quantity": quantity }),
        )
        .await
}

pub async fn update_cart_item(gateway: &ApiGateway, id: CartItemId, quantity: u32) -> ApiResponse {
    gateway
        .post("/cart/update", json!({ "id": id, "quantity": quantity }))
        .await
}

/// The backend stores selection as `1`/`0`.
pub async fn select_cart_item(gateway: &ApiGateway, id: CartItemId, selected: bool) -> ApiResponse {
    gateway
        .post(
            "/cart/select",
            json!({ "id": id, "selected": u8::from(selected) }),
        )
        .await
}

pub async fn select_all_cart_items(gateway: &ApiGateway, selected: bool) -> ApiResponse {
    gateway
        .post("/cart/select-all", json!({ "selected": u8::from(selected) }))
        .await
}

pub async fn delete_cart_item(gateway: &ApiGateway, id: CartItemId) -> ApiResponse {
    gateway
        .delete(&with_query("/cart/delete", &[("id", id.to_string().as_str())]))
        .await
}

pub async fn clear_cart(gateway: &ApiGateway) -> ApiResponse {
    gateway.post("/cart/clear", json!({})).await
}

/// Creates an order from the selected cart items.
pub async fn create_order(gateway: &ApiGateway, address: AddressId, remark: Option<&str>) -> ApiResponse {
    gateway
        .post(
            "/order/create",
            json!({ "address_id": address, "remark": remark.unwrap_or_default() }),
        )
        .await
}

pub async fn pay_order(gateway: &ApiGateway, order: OrderId, pay_type: &str) -> ApiResponse {
    gateway
        .post("/order/pay", json!({ "order_id": order, "pay_type": pay_type }))
        .await
}

pub async fn cancel_order(gateway: &ApiGateway, order: OrderId) -> ApiResponse {
    gateway
        .post("/order/cancel", json!({ "order_id": order }))
        .await
}

pub async fn confirm_receipt(gateway: &ApiGateway, order: OrderId) -> ApiResponse {
    gateway
        .post("/order/receive", json!({ "order_id": order }))
        .await
}

/// `status` filters by order state when set.
pub async fn orders(gateway: &ApiGateway, status: Option<i64>) -> ApiResponse {
    let status = status.map(|status| status.to_string());
    let pairs: Vec<(&str, &str)> = status.as_deref().map(|s| ("status", s)).into_iter().collect();
    gateway.get(&with_query("/orders", &pairs)).await
}

pub async fn order(gateway: &ApiGateway, id: OrderId) -> ApiResponse {
    gateway
        .get(&with_query("/order", &[("id", id.to_string().as_str())]))
        .await
}

pub async fn addresses(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/addresses").await
}

pub async fn create_address(gateway: &ApiGateway, address: Value) -> ApiResponse {
    gateway.post("/address/create", address).await
}

/// `address` must carry its `id`.
pub async fn update_address(gateway: &ApiGateway, address: Value) -> ApiResponse {
    gateway.post("/address/update", address).await
}

pub async fn delete_address(gateway: &ApiGateway, id: AddressId) -> ApiResponse {
    gateway
        .delete(&with_query("/address/delete", &[("id", id.to_string().as_str())]))
        .await
}

pub async fn set_default_address(gateway: &ApiGateway, id: AddressId) -> ApiResponse {
    gateway
        .post("/address/default", json!({ "id": id }))
        .await
}

pub async fn seller_products(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/seller/products").await
}

pub async fn seller_create_product(gateway: &ApiGateway, product: Value) -> ApiResponse {
    gateway.post("/seller/product/create", product).await
}

/// `product` must carry its `id`.
pub async fn seller_update_product(gateway: &ApiGateway, product: Value) -> ApiResponse {
    gateway.post("/seller/product/update", product).await
}

pub async fn seller_delete_product(gateway: &ApiGateway, id: ProductId) -> ApiResponse {
    gateway
        .delete(&with_query("/seller/product/delete", &[("id", id.to_string().as_str())]))
        .await
}

pub async fn seller_update_stock(gateway: &ApiGateway, product: ProductId, quantity: i64) -> ApiResponse {
    gateway
        .post(
            "/seller/product/stock",
            json!({ "product_id": product, "quantity": quantity }),
        )
        .await
}

pub async fn seller_orders(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/seller/orders").await
}

pub async fn ship_order(gateway: &ApiGateway, order: OrderId, tracking_no: &str) -> ApiResponse {
    gateway
        .post(
            "/seller/order/ship",
            json!({ "order_id": order, "tracking_no": tracking_no }),
        )
        .await
}

pub async fn seller_order_stats(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/seller/order/stats").await
}

pub async fn seller_reviews(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/seller/reviews").await
}

pub async fn reply_review(gateway: &ApiGateway, review: ReviewId, reply: &str) -> ApiResponse {
    gateway
        .post(
            "/seller/review/reply",
            json!({ "review_id": review, "reply": reply }),
        )
        .await
}

/// Shop name, description and logo of the current seller.
pub async fn update_seller_info(gateway: &ApiGateway, shop: Value) -> ApiResponse {
    gateway.post("/user/seller", shop).await
}

/// Reviews a product of a completed order. `rating` is 1 to 5.
pub async fn create_review(
    gateway: &ApiGateway,
    order: OrderId,
    product: ProductId,
    rating: u8,
    content: &str,
) -> ApiResponse {
    gateway
        .post(
            "/review/create",
            json!({
                "order_id": order,
                "product_id": product,
                "rating": rating,
                "content": content,
            }),
        )
        .await
}

pub async fn admin_order_stats(gateway: &ApiGateway) -> ApiResponse {
    gateway.get("/admin/order/stats").await
}

pub async fn admin_update_user_status(gateway: &ApiGateway, user: UserId, status: i64) -> ApiResponse {
    gateway
        .post("/admin/user/status", json!({ "user_id": user, "status": status }))
        .await
}

pub async fn admin_update_seller_status(gateway: &ApiGateway, seller: i64, status: i64) -> ApiResponse {
    gateway
        .post(
            "/admin/seller/status",
            json!({ "seller_id": seller, "status": status }),
        )
        .await
}

pub async fn admin_update_product_status(
    gateway: &ApiGateway,
    product: ProductId,
    status: i64,
) -> ApiResponse {
    gateway
        .post(
            "/admin/product/status",
            json!({ "product_id": product, "status": status }),
        )
        .await
}
