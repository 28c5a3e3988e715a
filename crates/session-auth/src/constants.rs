//! Fixed store keys and default authentication server paths

/// Store key for the short-lived access credential
pub const ACCESS_KEY: &str = "access";

/// Store key for the longer-lived refresh credential
pub const REFRESH_KEY: &str = "refresh";

/// Store key for cached user profile data, cleared with the session
pub const USER_KEY: &str = "user";

/// Store key for the location to return to after the next login
pub const REDIRECT_AFTER_LOGIN_KEY: &str = "redirect_after_login";

/// Refresh exchange path, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/token/refresh/";

/// Login (token pair issue) path
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login/";

/// Logout (refresh credential blacklist) path
pub const DEFAULT_LOGOUT_PATH: &str = "/auth/logout/";
