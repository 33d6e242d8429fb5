//! Backend paths, relative to `api.base_url`.

pub const AUTH_LOGIN: &str = "/auth/login";
pub const AUTH_REGISTER: &str = "/auth/register";
pub const AUTH_LOGOUT: &str = "/auth/logout";
pub const AUTH_REFRESH: &str = "/auth/refresh";
pub const AUTH_ME: &str = "/auth/me";

pub const PRODUCTS: &str = "/products";
pub const ORDERS: &str = "/orders";
pub const MY_ORDERS: &str = "/orders/my-orders";
pub const USER_PROFILE: &str = "/users/profile";
pub const CHANGE_PASSWORD: &str = "/users/change-password";

pub fn product(id: &str) -> String {
    format!("{}/{}", PRODUCTS, id)
}

pub fn order(id: &str) -> String {
    format!("{}/{}", ORDERS, id)
}
