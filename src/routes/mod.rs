/// Router Module Index
///
/// The URL authorization table, expressed structurally: routes live in the
/// module matching their access level, and the layers applied when the
/// modules are merged enforce that level. Keeping the split explicit means a
/// broad rule can never shadow a specific one.

/// Routes open to everyone: the storefront, the account gateways (register,
/// login, logout) and the cart.
pub mod public;

/// Routes requiring a valid session (checkout, profile).
pub mod authenticated;

/// Routes nested under /admin, restricted to the 'admin' role.
pub mod admin;
