use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{OrderStatus, PaymentStatus, UserRole};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::user::get_profile,
        handlers::product::list_products,
        handlers::product::get_product,
        handlers::product::create_product,
        handlers::product::update_product,
        handlers::product::delete_product,
        handlers::order::place_order,
        handlers::order::list_my_orders,
        handlers::order::get_order,
        handlers::admin::list_all_orders,
        handlers::admin::update_order_status,
        handlers::admin::inventory_alerts,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            UserResponse,
            UserStatistics,
            AuthResponse,
            UserRole,
            CreateProductRequest,
            UpdateProductRequest,
            ProductQuery,
            ProductResponse,
            InventoryAlertsResponse,
            CartItemRequest,
            PlaceOrderRequest,
            UpdateOrderStatusRequest,
            OrderQuery,
            OrderItemResponse,
            OrderResponse,
            OrderStatus,
            PaymentStatus,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication API"),
        (name = "user", description = "User profile API"),
        (name = "product", description = "Product catalog API"),
        (name = "order", description = "Order API"),
        (name = "admin", description = "Admin API"),
    ),
    info(
        title = "Pharmacy Backend API",
        version = "1.0.0",
        description = "Pharmacy inventory and order management REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
