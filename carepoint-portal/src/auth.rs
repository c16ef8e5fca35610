//! Account flows: registration, confirmation, sign-in/out and password
//! reset. Forms are checked here before the identity provider is called.

use carepoint_core::validation::{validate_email, validate_strong_password, ValidationErrors};
use carepoint_core::{Session, SignUpRequest};
use carepoint_shared::Role;
use tracing::{info, warn};

use crate::error::PortalError;
use crate::middleware::{landing_for, View};
use crate::state::PortalContext;

#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub specialty: String,
    pub languages: String,
    pub location: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !validate_email(email) {
        errors.add("email", "Enter a valid email");
    }
}

fn check_code(code: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if code.trim().is_empty() {
        errors.add("code", "Enter the verification code");
    }
    errors.into_result()
}

impl SignUpForm {
    /// Doctors must also give a specialty and a location.
    pub fn validate(&self) -> Result<SignUpRequest, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let email = normalize_email(&self.email);

        if self.first_name.trim().is_empty() {
            errors.add("firstName", "Enter your first name");
        }
        if self.last_name.trim().is_empty() {
            errors.add("lastName", "Enter your last name");
        }
        check_email(&mut errors, &email);
        if !validate_strong_password(&self.password) {
            errors.add("password", "Password must meet complexity requirements");
        }

        let role = self.role.parse::<Role>().ok();
        match role {
            None => errors.add("role", "Choose a role"),
            Some(Role::Doctor) => {
                if self.specialty.trim().is_empty() {
                    errors.add("specialty", "Enter a specialty");
                }
                if self.location.trim().is_empty() {
                    errors.add("location", "Enter a location");
                }
            }
            Some(Role::Patient) => {}
        }

        errors.into_result()?;
        let role = role.unwrap_or(Role::Patient);
        let doctor_field = |value: &str| if role == Role::Doctor { non_empty(value) } else { None };

        Ok(SignUpRequest {
            email,
            password: self.password.clone().into(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            role,
            specialty: doctor_field(&self.specialty),
            languages: doctor_field(&self.languages),
            location: doctor_field(&self.location),
        })
    }
}

pub async fn sign_up(ctx: &PortalContext, form: &SignUpForm) -> Result<(), PortalError> {
    let request = form.validate()?;
    ctx.identity.sign_up(&request).await?;
    info!("Sign-up submitted for {}, awaiting confirmation", request.email);
    Ok(())
}

pub async fn confirm_sign_up(ctx: &PortalContext, email: &str, code: &str) -> Result<View, PortalError> {
    check_code(code)?;
    ctx.identity.confirm_sign_up(&normalize_email(email), code.trim()).await?;
    Ok(View::SignIn)
}

pub async fn resend_code(ctx: &PortalContext, email: &str) -> Result<(), PortalError> {
    let email = normalize_email(email);
    let mut errors = ValidationErrors::new();
    check_email(&mut errors, &email);
    errors.into_result()?;

    ctx.identity.resend_confirmation(&email).await?;
    Ok(())
}

/// Authenticate, persist the new session and pick the landing view.
pub async fn sign_in(ctx: &PortalContext, email: &str, password: &str) -> Result<(Session, View), PortalError> {
    let email = normalize_email(email);
    let mut errors = ValidationErrors::new();
    check_email(&mut errors, &email);
    if password.is_empty() {
        errors.add("password", "Enter your password");
    }
    errors.into_result()?;

    let tokens = ctx.identity.authenticate(&email, password).await?;
    let session = Session::from_tokens(&email, tokens);
    ctx.sessions.persist(&session)?;

    let view = landing_for(&session);
    let who = session.display_name().unwrap_or_else(|| session.email.clone());
    info!("{} signed in, landing on {:?}", who, view);
    Ok((session, view))
}

/// Always clears the local session, even when the provider call fails.
pub async fn sign_out(ctx: &PortalContext) -> Result<View, PortalError> {
    if let Some(email) = ctx.sessions.current_email() {
        if let Err(e) = ctx.identity.sign_out(&email).await {
            warn!("Provider sign-out failed for {}: {}", email, e);
        }
    }
    ctx.sessions.clear()?;
    ctx.drafts().clear();
    info!("Signed out");
    Ok(View::Landing)
}

pub async fn forgot_password(ctx: &PortalContext, email: &str) -> Result<(), PortalError> {
    let email = normalize_email(email);
    let mut errors = ValidationErrors::new();
    check_email(&mut errors, &email);
    errors.into_result()?;

    ctx.identity.forgot_password(&email).await?;
    Ok(())
}

pub async fn confirm_password_reset(
    ctx: &PortalContext,
    email: &str,
    code: &str,
    new_password: &str,
) -> Result<View, PortalError> {
    check_code(code)?;
    if !validate_strong_password(new_password) {
        let mut errors = ValidationErrors::new();
        errors.add("newPassword", "Password does not meet complexity requirements");
        return Err(errors.into());
    }

    ctx.identity
        .confirm_password_reset(&normalize_email(email), code.trim(), new_password)
        .await?;
    Ok(View::SignIn)
}
