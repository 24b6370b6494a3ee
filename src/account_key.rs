use std::{fmt, fs, path::Path};

use openssl::{
    ec::EcKey,
    error::ErrorStack,
    nid::Nid,
    pkey::{Id, PKey, Private, Public},
    rsa::Rsa,
    sha::sha256,
};
use thiserror::Error;

use crate::{
    base64::Base64,
    jwk::{Jwk, JwkError},
};

/// 鍵相關操作的錯誤列舉，涵蓋 OpenSSL、檔案讀取與 JWK 解析錯誤。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL key operation failed")]
    OpenSSL(#[from] ErrorStack),
    #[error("Failed to read key file")]
    Io(#[from] std::io::Error),
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("Invalid JWK")]
    Jwk(#[from] JwkError),
}

/// 本模組使用的結果類型，當中錯誤皆為 `KeyError`。
type Result<T> = std::result::Result<T, KeyError>;

/// JWS 簽章演算法標籤，由金鑰類型決定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RSASSA-PKCS1-v1_5 搭配 SHA-256。
    Rs256,
    /// ECDSA P-256 搭配 SHA-256。
    Es256,
}

impl Algorithm {
    /// 返回 JWS `alg` 欄位使用的字串。
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Rs256 => "RS256",
            Algorithm::Es256 => "ES256",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已註冊帳戶的非對稱金鑰。
///
/// 此結構包含演算法標籤、私鑰與對應的公鑰，以及載入時計算一次的 JWK thumbprint。
pub struct AccountKey {
    /// 由金鑰類型推導的簽章演算法。
    pub alg: Algorithm,
    /// 私鑰，使用 OpenSSL 的 `PKey` 封裝。
    pub pri_key: PKey<Private>,
    /// 公鑰，從私鑰派生而來。
    pub pub_key: PKey<Public>,
    thumbprint: String,
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("alg", &self.alg)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl AccountKey {
    /// 從檔案載入帳戶金鑰。
    ///
    /// 檔案內容可以是私鑰 JWK 文件，或 PEM 格式私鑰（以 `-----BEGIN` 開頭）。
    ///
    /// # 回傳
    ///
    /// 成功回傳 `AccountKey`；格式錯誤或金鑰類型不支援時回傳 `KeyError`。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        if data.trim_start().starts_with("-----BEGIN") {
            Self::from_pem(data.as_bytes())
        } else {
            Self::from_jwk_json(&data)
        }
    }

    /// 根據私鑰 JWK 文件建立帳戶金鑰。
    pub fn from_jwk_json(json: &str) -> Result<Self> {
        let jwk = Jwk::from_json(json)?;
        Self::from_private_key(jwk.to_private_key()?)
    }

    /// 根據 PEM 格式的私鑰資料建立帳戶金鑰。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        Self::from_private_key(pri_key)
    }

    /// 根據私鑰推導演算法、公鑰與 thumbprint。
    ///
    /// 只接受 RSA 與 P-256 橢圓曲線金鑰，其他類型回傳 [`KeyError::UnsupportedKeyType`]。
    pub fn from_private_key(pri_key: PKey<Private>) -> Result<Self> {
        let alg = Self::algorithm_for(&pri_key)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        let thumbprint = Self::compute_thumbprint(&pub_key)?;

        Ok(Self {
            alg,
            pri_key,
            pub_key,
            thumbprint,
        })
    }

    fn algorithm_for(pri_key: &PKey<Private>) -> Result<Algorithm> {
        match pri_key.id() {
            Id::RSA => Ok(Algorithm::Rs256),
            Id::EC => {
                let curve = pri_key.ec_key()?.group().curve_name();
                if curve == Some(Nid::X9_62_PRIME256V1) {
                    Ok(Algorithm::Es256)
                } else {
                    Err(KeyError::UnsupportedKeyType(format!("EC {:?}", curve)))
                }
            }
            other => Err(KeyError::UnsupportedKeyType(format!("{:?}", other))),
        }
    }

    /// 根據私鑰派生出對應的公鑰。
    fn derive_public_key(pri_key: &PKey<Private>) -> Result<PKey<Public>> {
        match pri_key.id() {
            Id::RSA => {
                let rsa = pri_key.rsa()?;
                let pub_rsa =
                    Rsa::from_public_components(rsa.n().to_owned()?, rsa.e().to_owned()?)?;
                Ok(PKey::from_rsa(pub_rsa)?)
            }
            Id::EC => {
                let ec = pri_key.ec_key()?;
                let pub_ec = EcKey::from_public_key(ec.group(), ec.public_key())?;
                Ok(PKey::from_ec_key(pub_ec)?)
            }
            other => Err(KeyError::UnsupportedKeyType(format!("{:?}", other))),
        }
    }

    /// 透過 RFC 7638 JSON 與 SHA-256 計算 thumbprint，以 URL-safe Base64 字串回傳。
    fn compute_thumbprint(pub_key: &PKey<Public>) -> Result<String> {
        let jwk = Jwk::from_public_key(pub_key)?;
        let hash = sha256(jwk.to_thumbprint_json()?.as_bytes());
        Ok(Base64::new(hash).base64_url())
    }

    /// 返回金鑰的 JWK thumbprint，只與公鑰參數有關。
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use openssl::ec::EcGroup;

    use super::*;

    pub(crate) fn rsa_key() -> AccountKey {
        let rsa = Rsa::generate(2048).unwrap();
        AccountKey::from_private_key(PKey::from_rsa(rsa).unwrap()).unwrap()
    }

    pub(crate) fn ec_key() -> AccountKey {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = EcKey::generate(&group).unwrap();
        AccountKey::from_private_key(PKey::from_ec_key(ec).unwrap()).unwrap()
    }

    /// 將私鑰輸出為 JWK 文件，模擬帳戶金鑰檔。
    pub(crate) fn to_private_jwk(key: &AccountKey) -> String {
        let b64 = |bytes: Vec<u8>| Base64::new(bytes).base64_url();
        match key.alg {
            Algorithm::Rs256 => {
                let rsa = key.pri_key.rsa().unwrap();
                serde_json::json!({
                    "kty": "RSA",
                    "n": b64(rsa.n().to_vec()),
                    "e": b64(rsa.e().to_vec()),
                    "d": b64(rsa.d().to_vec()),
                    "p": b64(rsa.p().unwrap().to_vec()),
                    "q": b64(rsa.q().unwrap().to_vec()),
                    "dp": b64(rsa.dmp1().unwrap().to_vec()),
                    "dq": b64(rsa.dmq1().unwrap().to_vec()),
                    "qi": b64(rsa.iqmp().unwrap().to_vec()),
                })
                .to_string()
            }
            Algorithm::Es256 => {
                let ec = key.pri_key.ec_key().unwrap();
                let mut ctx = openssl::bn::BigNumContext::new().unwrap();
                let mut x = openssl::bn::BigNum::new().unwrap();
                let mut y = openssl::bn::BigNum::new().unwrap();
                ec.public_key()
                    .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
                    .unwrap();
                serde_json::json!({
                    "kty": "EC",
                    "crv": "P-256",
                    "x": b64(x.to_vec_padded(32).unwrap()),
                    "y": b64(y.to_vec_padded(32).unwrap()),
                    "d": b64(ec.private_key().to_vec_padded(32).unwrap()),
                })
                .to_string()
            }
        }
    }

    #[test]
    fn test_algorithm_from_key_type() {
        assert_eq!(rsa_key().alg, Algorithm::Rs256);
        assert_eq!(ec_key().alg, Algorithm::Es256);
    }

    #[test]
    fn test_thumbprint_is_stable_across_loads() -> Result<()> {
        for key in [rsa_key(), ec_key()] {
            let jwk = to_private_jwk(&key);
            let first = AccountKey::from_jwk_json(&jwk)?;
            let second = AccountKey::from_jwk_json(&jwk)?;
            assert_eq!(first.thumbprint(), key.thumbprint());
            assert_eq!(second.thumbprint(), key.thumbprint());
            assert_eq!(first.alg, key.alg);
        }
        Ok(())
    }

    #[test]
    fn test_thumbprint_depends_on_public_key_only() -> Result<()> {
        let key = rsa_key();
        let pem = key.pri_key.private_key_to_pem_pkcs8()?;
        let from_pem = AccountKey::from_pem(&pem)?;
        let from_jwk = AccountKey::from_jwk_json(&to_private_jwk(&key))?;
        assert_eq!(from_pem.thumbprint(), from_jwk.thumbprint());
        assert_ne!(rsa_key().thumbprint(), key.thumbprint());
        Ok(())
    }

    #[test]
    fn test_rejects_unsupported_curve() {
        let group = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
        let ec = EcKey::generate(&group).unwrap();
        let result = AccountKey::from_private_key(PKey::from_ec_key(ec).unwrap());
        assert!(matches!(result, Err(KeyError::UnsupportedKeyType(_))));
    }

    #[test]
    fn test_rejects_malformed_jwk() {
        assert!(matches!(
            AccountKey::from_jwk_json("not json"),
            Err(KeyError::Jwk(JwkError::SerializationError(_)))
        ));
        assert!(matches!(
            AccountKey::from_jwk_json(r#"{"kty":"OKP","crv":"Ed25519","x":"AA"}"#),
            Err(KeyError::Jwk(JwkError::UnsupportedKeyType(_)))
        ));
    }

    #[test]
    fn test_from_file_accepts_jwk_and_pem() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let key = ec_key();

        let jwk_path = dir.path().join("private_key.json");
        fs::write(&jwk_path, to_private_jwk(&key))?;
        assert_eq!(AccountKey::from_file(&jwk_path)?.thumbprint(), key.thumbprint());

        let pem_path = dir.path().join("account.pem");
        fs::write(&pem_path, key.pri_key.private_key_to_pem_pkcs8()?)?;
        assert_eq!(AccountKey::from_file(&pem_path)?.thumbprint(), key.thumbprint());
        Ok(())
    }
}
