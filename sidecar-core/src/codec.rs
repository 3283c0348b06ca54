/*!
Store file codec.

The record is serialized as JSON and then passed through an obfuscation pass.
The default pass XORs every byte against a repeating key. This is not
encryption: it only keeps the file from being edited casually by hand.
*/

use crate::record::StoreRecord;
use crate::{Result, SidecarError};

/// Default key for [`XorObfuscator`]
pub const DEFAULT_OBFUSCATION_KEY: &str = "Ff2hiu0ofQ456ftoFM";

/// Reversible byte transform applied to the encoded store
///
/// Implementations must be self-inverse: applying the transform twice yields
/// the original bytes.
pub trait Obfuscator {
    /// Transform the input bytes (both directions)
    fn apply(&self, data: &[u8]) -> Vec<u8>;

    /// Get the name of the obfuscation scheme
    fn algorithm_name(&self) -> &str;
}

/// XOR obfuscation against a repeating key
///
/// Byte `i` of the output is `data[i] ^ key[i % key.len()]`.
///
/// # Example
/// ```rust
/// use sidecar_core::{Obfuscator, XorObfuscator};
///
/// let xor = XorObfuscator::new("secret");
/// let hidden = xor.apply(b"{\"gold\":1}");
/// assert_eq!(xor.apply(&hidden), b"{\"gold\":1}");
/// ```
#[derive(Debug, Clone)]
pub struct XorObfuscator {
    key: Vec<u8>,
}

impl XorObfuscator {
    /// Create an obfuscator with the given key
    ///
    /// An empty key leaves the data unchanged.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }
}

impl Default for XorObfuscator {
    fn default() -> Self {
        Self::new(DEFAULT_OBFUSCATION_KEY)
    }
}

impl Obfuscator for XorObfuscator {
    fn apply(&self, data: &[u8]) -> Vec<u8> {
        xor_cycle(data, &self.key)
    }

    fn algorithm_name(&self) -> &str {
        "xor"
    }
}

/// Pass-through obfuscator, handy when inspecting store files in tests
#[derive(Debug, Clone, Default)]
pub struct NoObfuscation;

impl NoObfuscation {
    pub fn new() -> Self {
        Self
    }
}

impl Obfuscator for NoObfuscation {
    fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// XOR `data` against `key`, cycling the key
pub fn xor_cycle(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// Encodes and decodes [`StoreRecord`]s
#[derive(Debug, Clone)]
pub struct StoreCodec<O: Obfuscator> {
    obfuscator: O,
}

impl<O: Obfuscator> StoreCodec<O> {
    pub fn new(obfuscator: O) -> Self {
        Self { obfuscator }
    }

    /// Serialize the record to JSON and obfuscate it
    ///
    /// # Errors
    /// * `SidecarError::Json` - If a stored value cannot be serialized
    pub fn encode(&self, record: &StoreRecord) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(record).map_err(SidecarError::Json)?;
        Ok(self.obfuscator.apply(&json))
    }

    /// Remove the obfuscation and parse the record
    ///
    /// # Errors
    /// * `SidecarError::MalformedStore` - If the bytes are not a well-formed record
    pub fn decode(&self, bytes: &[u8]) -> Result<StoreRecord> {
        let json = self.obfuscator.apply(bytes);
        serde_json::from_slice(&json).map_err(|e| SidecarError::malformed(e.to_string()))
    }

    pub fn algorithm_name(&self) -> &str {
        self.obfuscator.algorithm_name()
    }
}
