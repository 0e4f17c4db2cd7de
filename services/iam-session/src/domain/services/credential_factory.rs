//! 会话凭证工厂
//!
//! 生成高熵随机密钥及其加盐的 Argon2id 哈希。哈希和校验都是 CPU 密集操作，
//! 在阻塞线程池中执行，不持有任何锁。
//!
//! 调用方超时只会放弃等待，已提交的 Argon2 计算仍会在阻塞线程池中跑完。
//! 超时请求集中出现时 CPU 开销不会随之释放，按峰值并发与单次哈希耗时设置
//! tokio 运行时的 `max_blocking_threads`。

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, Salt, SaltString},
};
use async_trait::async_trait;
use latch_config::{HashingConfig, MIN_SECRET_BYTES, SessionConfig};
use latch_errors::{AppError, AppResult};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::SecretString;

/// 新生成的凭证
#[derive(Debug)]
pub struct GeneratedCredential {
    /// 明文密钥，只交给客户端
    pub secret: SecretString,
    /// PHC 格式的哈希，只存入持久化层
    pub credential_hash: String,
}

/// 凭证工厂 trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialFactory: Send + Sync {
    /// 生成随机密钥与哈希
    async fn generate_credential(&self) -> AppResult<GeneratedCredential>;

    /// 校验密钥与哈希是否匹配；不匹配返回 `Ok(false)`
    async fn verify_credential(&self, secret: &str, credential_hash: &str) -> AppResult<bool>;

    /// 对一个固定的诱饵哈希执行校验，耗时与真实校验相同，结果丢弃
    async fn verify_against_decoy(&self, secret: &str) -> AppResult<()>;
}

/// 基于 Argon2id 的凭证工厂
#[derive(Clone)]
pub struct Argon2CredentialFactory {
    argon2: Argon2<'static>,
    secret_bytes: usize,
    decoy_hash: String,
}

impl Argon2CredentialFactory {
    pub fn new(hashing: &HashingConfig, secret_bytes: usize) -> AppResult<Self> {
        if secret_bytes < MIN_SECRET_BYTES {
            return Err(AppError::invalid_input(format!(
                "Session secrets need at least {} random bytes (got {})",
                MIN_SECRET_BYTES, secret_bytes
            )));
        }

        let params = Params::new(
            hashing.memory_kib,
            hashing.iterations,
            hashing.parallelism,
            None,
        )
        .map_err(|e| AppError::invalid_input(format!("Invalid hashing parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy_hash = hash_secret(&argon2, &random_secret(secret_bytes)?)?;

        Ok(Self {
            argon2,
            secret_bytes,
            decoy_hash,
        })
    }

    pub fn from_config(config: &SessionConfig) -> AppResult<Self> {
        Self::new(&config.hashing, config.secret_bytes)
    }
}

#[async_trait]
impl CredentialFactory for Argon2CredentialFactory {
    async fn generate_credential(&self) -> AppResult<GeneratedCredential> {
        let argon2 = self.argon2.clone();
        let secret_bytes = self.secret_bytes;

        tokio::task::spawn_blocking(move || -> AppResult<GeneratedCredential> {
            let secret = random_secret(secret_bytes)?;
            let credential_hash = hash_secret(&argon2, &secret)?;

            Ok(GeneratedCredential {
                secret: SecretString::new(secret),
                credential_hash,
            })
        })
        .await
        .map_err(|e| AppError::crypto_failure(format!("Credential generation task failed: {}", e)))?
    }

    async fn verify_credential(&self, secret: &str, credential_hash: &str) -> AppResult<bool> {
        let argon2 = self.argon2.clone();
        let secret = secret.to_owned();
        let credential_hash = credential_hash.to_owned();

        tokio::task::spawn_blocking(move || verify_secret(&argon2, &secret, &credential_hash))
            .await
            .map_err(|e| {
                AppError::crypto_failure(format!("Credential verification task failed: {}", e))
            })?
    }

    async fn verify_against_decoy(&self, secret: &str) -> AppResult<()> {
        self.verify_credential(secret, &self.decoy_hash).await?;
        Ok(())
    }
}

/// 从系统 CSPRNG 读取 `len` 字节并以十六进制输出
fn random_secret(len: usize) -> AppResult<String> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        AppError::crypto_failure(format!("Failed to read system randomness: {}", e))
    })?;
    Ok(hex::encode(bytes))
}

fn hash_secret(argon2: &Argon2<'_>, secret: &str) -> AppResult<String> {
    let mut salt = [0u8; Salt::RECOMMENDED_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| AppError::crypto_failure(format!("Failed to generate salt: {}", e)))?;
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| AppError::crypto_failure(format!("Failed to encode salt: {}", e)))?;

    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::crypto_failure(format!("Failed to hash session secret: {}", e)))
}

fn verify_secret(argon2: &Argon2<'_>, secret: &str, credential_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(credential_hash).map_err(|e| {
        AppError::crypto_failure(format!("Stored credential hash is malformed: {}", e))
    })?;

    // 校验使用哈希串中记录的参数，调整工作量不会让旧会话失效
    match argon2.verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::crypto_failure(format!(
            "Credential verification failed: {}",
            e
        ))),
    }
}
