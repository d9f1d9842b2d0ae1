use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use fantastic_task_shared::auth::Role;
use fantastic_task_shared::jwt::JwtClaims;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let tenant_prefix = ["api", "v1", "family", state.config.tenant_id.as_str()];
    if !segs.as_slice().starts_with(&tenant_prefix) {
        tracing::warn!(?segs, "ACL: path outside tenant scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[tenant_prefix.len()..];

    let decision = match claims.role {
        Role::Admin => allow_admin(&method, rest),
        Role::Member => allow_member(&method, rest),
        Role::Child => allow_child(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_member = ?claims.member_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_admin(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["tasks"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["tasks", "due"] if *method == Method::GET => Ok(()),
        ["tasks", _] if *method == Method::PUT || *method == Method::DELETE => Ok(()),
        ["members", _, "adjustments"] if *method == Method::POST => Ok(()),
        ["members", _, "reconcile"] if *method == Method::POST => Ok(()),
        _ => allow_member(method, rest),
    }
}

fn allow_member(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["members"] if *method == Method::GET => Ok(()),
        ["tasks"] if *method == Method::GET => Ok(()),
        ["tasks", "due"] if *method == Method::GET => Ok(()),
        ["members", _, "balance"] if *method == Method::GET => Ok(()),
        ["members", _, "transactions"] if *method == Method::GET => Ok(()),
        ["members", _, "completions"] if *method == Method::POST => Ok(()),
        ["completions", "pending"] if *method == Method::GET => Ok(()),
        ["completions", "pending", "count"] if *method == Method::GET => Ok(()),
        ["completions", id, action]
            if *method == Method::POST
                && (action == &"approve" || action == &"reject")
                && id.parse::<i32>().is_ok() =>
        {
            Ok(())
        }
        ["completions", id] if *method == Method::DELETE && id.parse::<i32>().is_ok() => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["members"] if *method == Method::GET => Ok(()),
        ["tasks"] if *method == Method::GET => Ok(()),
        ["tasks", "due"] if *method == Method::GET => Ok(()),
        ["members", member, "balance"] if *method == Method::GET => ensure_member(claims, member),
        ["members", member, "transactions"] if *method == Method::GET => {
            ensure_member(claims, member)
        }
        ["members", member, "completions"] if *method == Method::POST => {
            ensure_member(claims, member)
        }
        // Ownership of the completion is checked by the handler; the id
        // alone does not identify the member here.
        ["completions", id] if *method == Method::DELETE && id.parse::<i32>().is_ok() => Ok(()),
        ["events"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_member(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.member_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
