use crate::entities::{UserRole, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, UserResponse};
use crate::utils::{JwtService, hash_password, validate_password, verify_password};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(pool: DatabaseConnection, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        // 验证输入参数
        let email = request.email.trim().to_lowercase();
        validate_email(&email)?;
        if request.username.len() < 2 || request.username.len() > 30 {
            return Err(AppError::ValidationError(
                "Username length must be between 2 and 30 characters".to_string(),
            ));
        }
        validate_password(&request.password)?;

        // 检查邮箱是否已注册
        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.clone()))
            .one(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::ValidationError(
                "Email is already registered".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;

        let user = users::ActiveModel {
            email: Set(email),
            username: Set(request.username),
            password_hash: Set(password_hash),
            role: Set(UserRole::Customer),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;

        log::info!("User {} registered", user.id);

        let access_token = self
            .jwt_service
            .generate_token(user.id, &user.role.to_string())?;

        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token,
            expires_in: self.jwt_service.get_expires_in(),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.pool)
            .await?;

        // 不区分"用户不存在"与"密码错误", 避免账号探测
        let user = user
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        let is_valid = verify_password(&request.password, &user.password_hash)?;
        if !is_valid {
            return Err(AppError::AuthError("Invalid email or password".to_string()));
        }

        let access_token = self
            .jwt_service
            .generate_token(user.id, &user.role.to_string())?;

        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token,
            expires_in: self.jwt_service.get_expires_in(),
        })
    }
}

/// 够用的邮箱形状检查: 一个@、本地段与域名段非空、域名带点
fn validate_email(email: &str) -> AppResult<()> {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");

    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.ends_with('.') {
        return Err(AppError::ValidationError(
            "Invalid email address".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::MigratorTrait;
    use sea_orm::{ConnectOptions, Database};

    async fn setup_service() -> AuthService {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        AuthService::new(db, JwtService::new("test-secret", 3600))
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "jane@example.com".to_string(),
            username: "jane".to_string(),
            password: "Password123".to_string(),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jane@").is_err());
        assert!(validate_email("jane@nodot").is_err());
        assert!(validate_email("jane@dot.").is_err());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let service = setup_service().await;

        let registered = service.register(register_request()).await.unwrap();
        assert_eq!(registered.user.email, "jane@example.com");
        assert_eq!(registered.user.role, UserRole::Customer);
        assert!(!registered.access_token.is_empty());

        let logged_in = service
            .login(LoginRequest {
                email: "Jane@Example.com".to_string(), // 大小写不敏感
                password: "Password123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let service = setup_service().await;
        service.register(register_request()).await.unwrap();

        let err = service.register(register_request()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_login_failures_look_identical() {
        let service = setup_service().await;
        service.register(register_request()).await.unwrap();

        let wrong_password = service
            .login(LoginRequest {
                email: "jane@example.com".to_string(),
                password: "WrongPassword1".to_string(),
            })
            .await
            .unwrap_err();
        let unknown_email = service
            .login(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "Password123".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let service = setup_service().await;
        let mut req = register_request();
        req.password = "short".to_string();

        let err = service.register(req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
