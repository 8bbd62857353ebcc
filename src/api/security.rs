use std::str::FromStr;

use actix_web::{FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Claims of an admin token.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub admin: Option<bool>,
    pub iat: Option<usize>,
    pub exp: Option<usize>,
}

/**
 * JWT Security Service guarding the admin endpoints.
 */
#[derive(Clone)]
pub struct JwtSecurityService {
    /**
     * The decoding key used to verify JWT tokens.
     */
    decoding_key: DecodingKey,
    /**
     * The validation rules for JWT tokens.
     */
    validation: Validation,
}

impl JwtSecurityService {
    /**
     * Creates a new instance of `JwtSecurityService`.
     *
     * # Arguments
     * `key`: PEM encoded public key, or the shared secret for HMAC algorithms.
     * `algorithm`: The algorithm used for JWT token validation.
     *
     * # Returns
     * A Result containing the `JwtSecurityService` or an `ApplicationError` if initialization fails.
     */
    pub fn new(key: &str, algorithm: &str) -> Result<Self, ApplicationError> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid algorithm: {err}")))?;
        let decoding_key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => DecodingKey::from_rsa_pem(key.as_bytes()).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create decoding key: {err}")))?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(key.as_bytes()).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create decoding key: {err}")))?,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                if key.is_empty() {
                    return Err(ApplicationError::new(ErrorType::Initialization, "Shared secret must not be empty".to_string()));
                }
                DecodingKey::from_secret(key.as_bytes())
            }
            Algorithm::EdDSA => DecodingKey::from_ed_pem(key.as_bytes()).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to create decoding key: {err}")))?,
            _ => return Err(ApplicationError::new(ErrorType::Initialization, "Unsupported algorithm".to_string())),
        };
        let validation = Validation::new(algorithm);
        Ok(JwtSecurityService { decoding_key, validation })
    }

    /**
     * Validates the JWT token from the HTTP request.
     *
     * # Arguments
     * `http_request`: The HTTP request containing the JWT token in the Authorization header.
     *
     * # Returns
     * The claims of the token or a `JwtAuthorization` error if the token is missing or invalid.
     */
    pub fn validate(&self, http_request: &HttpRequest) -> Result<Claim, ApplicationError> {
        let credentials = BearerAuth::from_request(http_request, &mut actix_web::dev::Payload::None).into_inner().ok();
        let Some(credentials) = credentials else {
            return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()));
        };
        match jsonwebtoken::decode::<Claim>(credentials.token(), &self.decoding_key, &self.validation) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => {
                tracing::warn!("JWT validation error: {err}");
                Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()))
            }
        }
    }

    /**
     * Validates the token and requires the `admin` claim.
     *
     * # Returns
     * The claims, `JwtAuthorization` for a missing or invalid token, `Forbidden` for a valid non-admin token.
     */
    pub fn validate_admin(&self, http_request: &HttpRequest) -> Result<Claim, ApplicationError> {
        let claim = self.validate(http_request)?;
        if claim.admin != Some(true) {
            tracing::info!("Rejected non-admin token for {:?}", claim.sub);
            return Err(ApplicationError::new(ErrorType::Forbidden, "Forbidden".to_string()));
        }
        Ok(claim)
    }
}

/**
 * Tokens signed with a shared secret for tests.
 */
