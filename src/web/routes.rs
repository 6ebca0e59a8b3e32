//! Navigation targets of the viewer

/// A page or action the browser can be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Landing page with the login button
    Home,
    /// Starts the provider redirect
    Login,
    /// Provider redirect target
    Callback,
    /// Protected claims and tokens view
    Token,
    /// Ends the session
    Logout,
    /// Configuration and connectivity diagnostics
    Debug,
}

impl Route {
    pub const fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Callback => "/callback",
            Route::Token => "/token",
            Route::Logout => "/logout",
            Route::Debug => "/debug",
        }
    }

    /// Whether the route requires an authenticated session.
    pub const fn is_protected(self) -> bool {
        matches!(self, Route::Token)
    }
}
