//! Caller identity as asserted by the Static Web Apps front end.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod authorizer;
mod request_context;

pub use principal::{ClientPrincipal, PrincipalError, CLIENT_PRINCIPAL_HEADER};
pub use authorizer::{
    filter_roles, is_authorized, principal_from_headers, resolve_principal, Claim, ClaimKind, Principal,
    ANONYMOUS_ROLE, AUTHENTICATED_ROLE,
};
pub use request_context::{request_id_from_headers, RequestContext, REQUEST_ID_HEADER};
