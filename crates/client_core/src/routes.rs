//! Page tables of the two products this client drives.

use shared::domain::Role;

use crate::{
    router::{RoleGuard, Route, RouteError, RouteTable},
    views::{FetchView, StaticView},
};

pub const ADMIN_REQUIRED_MESSAGE: &str = "administrator access required";
pub const AUTHOR_REQUIRED_MESSAGE: &str = "only authors can write articles";
pub const SELLER_REQUIRED_MESSAGE: &str = "please log in with a seller account";

fn admin_only() -> RoleGuard {
    RoleGuard::new([Role::Admin], "/", ADMIN_REQUIRED_MESSAGE)
}

/// Blog: articles, comments, notifications and the admin area.
pub fn blog_routes() -> Result<RouteTable, RouteError> {
    let authors = || RoleGuard::new([Role::Admin, Role::Author], "/", AUTHOR_REQUIRED_MESSAGE);

    let routes = vec![
        Route::new(
            "home",
            "/",
            FetchView::new("home", "Latest articles")
                .source("articles", "/articles")
                .source("categories", "/categories")
                .source("tags", "/tags"),
        )?,
        Route::new("login", "/login", StaticView::new("login", "Log in"))?,
        Route::new("register", "/register", StaticView::new("register", "Sign up"))?,
        Route::new(
            "article",
            "/article/:id",
            FetchView::new("article", "Article")
                .source("article", "/articles/{id}")
                .source("comments", "/articles/{id}/comments"),
        )?,
        Route::new(
            "search",
            "/search",
            FetchView::new("search", "Search").source("results", "/search?q={q}"),
        )?,
        Route::new(
            "notifications",
            "/notifications",
            FetchView::new("notifications", "Notifications")
                .source("notifications", "/notifications"),
        )?
        .protected(),
        Route::new(
            "my_articles",
            "/my-articles",
            FetchView::new("my_articles", "My articles").source("articles", "/articles?mine=1"),
        )?
        .restricted(authors()),
        Route::new(
            "editor",
            "/editor",
            FetchView::new("editor", "New article")
                .source("categories", "/categories")
                .source("tags", "/tags"),
        )?
        .restricted(authors()),
        Route::new(
            "editor_edit",
            "/editor/:id",
            FetchView::new("editor", "Edit article")
                .source("article", "/articles/{id}")
                .source("categories", "/categories")
                .source("tags", "/tags"),
        )?
        .restricted(authors()),
        Route::new(
            "admin_users",
            "/admin/users",
            FetchView::new("admin_users", "Users").source("users", "/admin/users"),
        )?
        .restricted(admin_only()),
        Route::new(
            "admin_comments",
            "/admin/comments",
            FetchView::new("admin_comments", "Pending comments")
                .source("comments", "/admin/comments/pending"),
        )?
        .restricted(admin_only()),
        Route::new(
            "admin",
            "/admin/*page",
            StaticView::new("admin", "Administration"),
        )?
        .restricted(admin_only()),
    ];
    Ok(RouteTable::new(routes))
}

/// Marketplace: catalog, cart, orders, seller and admin back offices.
pub fn shop_routes() -> Result<RouteTable, RouteError> {
    let sellers = || RoleGuard::new([Role::Seller], "/login", SELLER_REQUIRED_MESSAGE);
    let seller_dashboard = || {
        FetchView::new("seller_dashboard", "Seller dashboard")
            .source("stats", "/seller/order/stats")
            .source("products", "/seller/products")
            .source("orders", "/seller/orders")
    };
    let admin_dashboard = || {
        FetchView::new("admin_dashboard", "Administration").source("stats", "/admin/order/stats")
    };
    let home = || {
        FetchView::new("home", "Home")
            .source("categories", "/categories")
            .source("hot", "/products/hot?limit=8")
            .source("new", "/products/new?limit=8")
    };

    let routes = vec![
        Route::new("home", "/", home())?,
        Route::new("home", "/index.html", home())?,
        Route::new("login", "/login", StaticView::new("login", "Log in"))?,
        Route::new("register", "/register", StaticView::new("register", "Sign up"))?,
        Route::new(
            "products",
            "/products",
            FetchView::new("products", "Products").source("products", "/products"),
        )?,
        Route::new(
            "product",
            "/product/:id",
            FetchView::new("product", "Product")
                .source("product", "/product?id={id}")
                .optional_source("reviews", "/reviews?product_id={id}"),
        )?,
        Route::new(
            "cart",
            "/cart",
            FetchView::new("cart", "Cart").source("cart", "/cart"),
        )?
        .protected(),
        Route::new(
            "checkout",
            "/checkout",
            FetchView::new("checkout", "Checkout")
                .source("cart", "/cart")
                .source("addresses", "/addresses"),
        )?
        .protected(),
        Route::new(
            "orders",
            "/orders",
            FetchView::new("orders", "My orders").source("orders", "/orders"),
        )?
        .protected(),
        Route::new(
            "order",
            "/order/:id",
            FetchView::new("order", "Order").source("order", "/order?id={id}"),
        )?
        .protected(),
        Route::new(
            "profile",
            "/user/profile",
            FetchView::new("profile", "Profile").source("user", "/auth/user"),
        )?
        .protected(),
        Route::new(
            "addresses",
            "/user/addresses",
            FetchView::new("addresses", "Addresses").source("addresses", "/addresses"),
        )?
        .protected(),
        Route::new("seller_dashboard", "/seller/dashboard", seller_dashboard())?
            .restricted(sellers()),
        Route::new(
            "seller_products",
            "/seller/products",
            FetchView::new("seller_products", "My products").source("products", "/seller/products"),
        )?
        .restricted(sellers()),
        Route::new(
            "seller_orders",
            "/seller/orders",
            FetchView::new("seller_orders", "Shop orders").source("orders", "/seller/orders"),
        )?
        .restricted(sellers()),
        Route::new(
            "seller_reviews",
            "/seller/reviews",
            FetchView::new("seller_reviews", "Reviews").source("reviews", "/seller/reviews"),
        )?
        .restricted(sellers()),
        Route::new("seller", "/seller/*page", seller_dashboard())?.restricted(sellers()),
        Route::new(
            "admin_users",
            "/admin/users",
            FetchView::new("admin_users", "Users").source("users", "/admin/users"),
        )?
        .restricted(admin_only()),
        Route::new(
            "admin_sellers",
            "/admin/sellers",
            FetchView::new("admin_sellers", "Sellers").source("sellers", "/admin/sellers"),
        )?
        .restricted(admin_only()),
        Route::new(
            "admin_products",
            "/admin/products",
            FetchView::new("admin_products", "Products").source("products", "/admin/products"),
        )?
        .restricted(admin_only()),
        Route::new(
            "admin_orders",
            "/admin/orders",
            FetchView::new("admin_orders", "Orders").source("orders", "/admin/orders"),
        )?
        .restricted(admin_only()),
        Route::new("admin", "/admin/*page", admin_dashboard())?.restricted(admin_only()),
    ];
    Ok(RouteTable::new(routes))
}
