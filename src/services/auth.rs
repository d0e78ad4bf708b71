use crate::{
    backend::{AuthProvider, AuthSession, RowStore},
    error::{AppError, AppResult, FormErrors},
    models::{Role, UserModel},
    state::AppState,
    utils::geo::Coordinates,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::{Validate, ValidateEmail};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    /// At least 8 characters
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
    /// Defaults to `citizen`
    #[serde(default = "default_role")]
    pub role: Role,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// City or town the NGO works in. Required for NGOs, ignored for citizens.
    pub operation_area: Option<String>,
}

fn default_role() -> Role {
    Role::Citizen
}

impl SignupRequest {
    /// Every failing field at once, including the role-dependent ones.
    pub fn form_errors(&self) -> FormErrors {
        let mut errors = match self.validate() {
            Ok(()) => FormErrors::new(),
            Err(e) => FormErrors::from(e),
        };

        if self.full_name.trim().is_empty() {
            errors.add("full_name", "Full name is required");
        }
        if self.password != self.confirm_password {
            errors.add("confirm_password", "Passwords do not match");
        }

        let location = Coordinates::from_parts(self.latitude, self.longitude);
        if let Some(location) = location {
            if !location.is_valid() {
                errors.add("location", "Location is out of range");
            }
        }

        if self.role == Role::Ngo {
            let area = self.operation_area.as_deref().unwrap_or("").trim();
            if area.is_empty() {
                errors.add("operation_area", "Operation area is required for NGOs");
            }
            if location.is_none() {
                errors.add("location", "Location is required for NGOs");
            }
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// The role the user expects to sign in as
    pub role: Option<Role>,
}

impl LoginRequest {
    pub fn form_errors(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", "Email is required");
        } else if !email.validate_email() {
            errors.add("email", "Please enter a valid email address");
        }
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        if self.role.is_none() {
            errors.add("role", "Please select your role");
        }
        errors
    }
}

pub struct AuthService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn RowStore>,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            auth: state.auth.clone(),
            store: state.store.clone(),
        }
    }

    /// Create the identity, then the profile sharing its id.
    pub async fn signup(&self, request: SignupRequest) -> AppResult<(UserModel, AuthSession)> {
        request.form_errors().into_result()?;

        let session = self.auth.sign_up(&request.email, &request.password).await?;

        let (latitude, longitude, operation_area) = match request.role {
            Role::Ngo => (
                request.latitude,
                request.longitude,
                request.operation_area.map(|a| a.trim().to_string()),
            ),
            Role::Citizen => (request.latitude, request.longitude, None),
        };

        let profile = UserModel {
            id: session.user_id,
            full_name: request.full_name.trim().to_string(),
            email: session.email.clone(),
            role: request.role.as_str().to_string(),
            latitude,
            longitude,
            operation_area,
            created_at: chrono::Utc::now().naive_utc(),
        };

        let profile = match self.store.insert_profile(profile).await {
            Ok(profile) => profile,
            Err(e) => {
                // Leave no live session behind for an account without a profile.
                if let Err(sign_out_err) = self.auth.sign_out(&session.access_token).await {
                    tracing::warn!("Failed to revoke session after profile error: {}", sign_out_err);
                }
                return Err(e);
            }
        };

        tracing::info!(user_id = %profile.id, role = %profile.role, "User signed up");
        Ok((profile, session))
    }

    /// Sign in and load the profile. A role mismatch is reported as bad
    /// credentials and the fresh session is revoked.
    pub async fn login(&self, request: LoginRequest) -> AppResult<(UserModel, AuthSession)> {
        request.form_errors().into_result()?;

        let session = self.auth.sign_in(&request.email, &request.password).await?;

        let profile = match self.store.find_profile(session.user_id).await? {
            Some(profile) => profile,
            None => {
                self.auth.sign_out(&session.access_token).await?;
                tracing::warn!(user_id = %session.user_id, "Profile not found at login");
                return Err(AppError::NotFound);
            }
        };

        if request.role.is_some_and(|role| role != profile.role()) {
            self.auth.sign_out(&session.access_token).await?;
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = %profile.id, "User logged in");
        Ok((profile, session))
    }

    pub async fn logout(&self, access_token: &str) -> AppResult<()> {
        self.auth.sign_out(access_token).await
    }

    pub async fn current_user(&self, user_id: uuid::Uuid) -> AppResult<UserModel> {
        self.store
            .find_profile(user_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(role: Role) -> SignupRequest {
        SignupRequest {
            full_name: "Asha Patil".to_string(),
            email: "asha@example.org".to_string(),
            password: "riverclean".to_string(),
            confirm_password: "riverclean".to_string(),
            role,
            latitude: None,
            longitude: None,
            operation_area: None,
        }
    }

    #[test]
    fn citizen_signup_without_location_is_valid() {
        assert!(signup(Role::Citizen).form_errors().is_empty());
    }

    #[test]
    fn ngo_signup_requires_area_and_location() {
        let errors = signup(Role::Ngo).form_errors();
        assert_eq!(
            errors.get("operation_area"),
            Some("Operation area is required for NGOs")
        );
        assert_eq!(errors.get("location"), Some("Location is required for NGOs"));
    }

    #[test]
    fn mismatched_passwords_and_bad_email_reported_together() {
        let mut request = signup(Role::Citizen);
        request.email = "not-an-email".to_string();
        request.confirm_password = "different".to_string();

        let errors = request.form_errors();
        assert_eq!(errors.get("confirm_password"), Some("Passwords do not match"));
        assert_eq!(errors.get("email"), Some("Please enter a valid email address"));
    }

    #[test]
    fn short_password_rejected() {
        let mut request = signup(Role::Citizen);
        request.password = "short".to_string();
        request.confirm_password = "short".to_string();
        assert_eq!(
            request.form_errors().get("password"),
            Some("Password must be at least 8 characters")
        );
    }

    #[test]
    fn login_requires_every_field() {
        let request = LoginRequest {
            email: String::new(),
            password: String::new(),
            role: None,
        };
        let errors = request.form_errors();
        assert_eq!(errors.get("email"), Some("Email is required"));
        assert_eq!(errors.get("password"), Some("Password is required"));
        assert_eq!(errors.get("role"), Some("Please select your role"));
    }
}
