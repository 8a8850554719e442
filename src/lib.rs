//! Encrypt and decrypt Qtum private keys with the bip-0038 standard.
//!
//! Two modes of operation are supported: wrapping an existing private key
//! under a passphrase (no ec multiply) and generating brand new encrypted
//! key pairs out of an intermediate passphrase (ec multiply), optionally
//! committing to lot and sequence numbers and producing confirmation codes.
//! Addresses and wif strings use the version bytes of the Qtum main and
//! test networks.

use aes::Aes256;
use aes::cipher::{
    BlockDecrypt,
    BlockEncrypt,
    generic_array::GenericArray,
    NewBlockCipher
};
use rand::RngCore;
use ripemd160::Ripemd160;
use scrypt::Params;
use secp256k1::{Secp256k1, SecretKey, PublicKey};
use sha2::Digest;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Magic bytes of intermediate passphrases carrying lot and sequence.
const MAGIC_LS: [u8; 8] = [0x2c, 0xe9, 0xb3, 0xe1, 0xff, 0x39, 0xe2, 0x51];

/// Magic bytes of intermediate passphrases without lot and sequence.
const MAGIC_NO_LS: [u8; 8] = [0x2c, 0xe9, 0xb3, 0xe1, 0xff, 0x39, 0xe2, 0x53];

/// Maximum allowed value of a lot number.
const MAX_LOT: u32 = 1_048_575;

/// Maximum allowed value of a sequence number.
const MAX_SEQ: u16 = 4095;

/// Number of bytes of a public key compressed.
const NBBY_PUBC: usize = 33;

/// Number of bytes of a public key uncompressed.
const NBBY_PUBU: usize = 65;

/// Prefix of all confirmation codes.
const PRE_CONF: [u8; 5] = [0x64, 0x3b, 0xf6, 0xa8, 0x9a];

/// Prefix of all ec encrypted keys.
const PRE_EC: [u8; 2] = [0x01, 0x43];

/// Prefix of all non ec encrypted keys.
const PRE_NON_EC: [u8; 2] = [0x01, 0x42];

/// Errors of the 'qtum-bip38' crate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd)]
pub enum Error {
    /// Decryption finished but the resulting address does not match the
    /// embedded address hash.
    BadPassphrase,
    /// Invalid character found on a base 58 string.
    InvalidCharacter,
    /// Base 58 check checksum did not match.
    InvalidChecksum,
    /// Secret scalar of zero or not lower than the curve order.
    InvalidKeyRange,
    /// Decoded payload with an unexpected number of bytes.
    InvalidLength,
    /// Lot number outside of the 0 - 1048575 range.
    InvalidLot,
    /// Owner salt with a number of bytes other than 8.
    InvalidOwnerSaltLength,
    /// Public key bytes that do not represent a point on the curve.
    InvalidPoint,
    /// Seed with a number of bytes other than 24.
    InvalidSeedLength,
    /// Sequence number outside of the 0 - 4095 range.
    InvalidSequence,
    /// Version byte that does not belong to the informed network.
    NetworkMismatch,
    /// Thrown if an error occurs when using the scrypt function.
    Scrypt,
    /// Payload that does not start with the magic bytes of the requested
    /// operation.
    UnexpectedPrefix,
    /// Reserved or unknown flag bits set on an encrypted key.
    UnsupportedFlag,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Error::BadPassphrase => "incorrect passphrase",
            Error::InvalidCharacter => "invalid base 58 character",
            Error::InvalidChecksum => "invalid base 58 check checksum",
            Error::InvalidKeyRange => "private key out of the valid range",
            Error::InvalidLength => "invalid payload length",
            Error::InvalidLot => "lot number out of range",
            Error::InvalidOwnerSaltLength => "owner salt must have 8 bytes",
            Error::InvalidPoint => "invalid public key bytes",
            Error::InvalidSeedLength => "seed must have 24 bytes",
            Error::InvalidSequence => "sequence number out of range",
            Error::NetworkMismatch => "version byte of another network",
            Error::Scrypt => "could not derive scrypt key",
            Error::UnexpectedPrefix => "unexpected payload prefix",
            Error::UnsupportedFlag => "unsupported flag byte",
        };
        f.write_str(message)
    }
}

impl std::error::Error for Error {}

/// Qtum network of an address or wif, selecting its version bytes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Network {
    /// Main Qtum network.
    Mainnet,
    /// Qtum test network.
    Testnet,
}

impl Network {
    /// Version byte of pay to public key hash addresses.
    fn prefix_p2pkh(self) -> u8 {
        match self {
            Network::Mainnet => 0x3a,
            Network::Testnet => 0x78,
        }
    }

    /// Version byte of private keys in wif encoding.
    fn prefix_wif(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }
}

/// Information recovered when decrypting an encrypted private key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decrypted {
    /// Wallet import format of the decrypted private key.
    pub wif: String,
    /// Raw bytes of the decrypted private key.
    pub private_key: [u8; 32],
    /// True if the key pair is used with compressed public keys.
    pub compress: bool,
    /// Serialized public key of the key pair.
    pub public_key: Vec<u8>,
    /// Seed used to generate the key (only on ec multiply mode).
    pub seed: Option<[u8; 24]>,
    /// Address of the key pair on the informed network.
    pub address: String,
    /// Lot and sequence numbers embedded on the key (only on ec multiply
    /// mode and if committed on creation).
    pub lot_sequence: Option<(u32, u16)>,
}

/// New encrypted private key generated out of an intermediate passphrase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Generated {
    /// Encrypted private key in base 58 check.
    pub encrypted_wif: String,
    /// Code allowing the passphrase holder to confirm the generated address.
    pub confirmation_code: String,
    /// Serialized public key of the generated key pair.
    pub public_key: Vec<u8>,
    /// Seed used on the generation.
    pub seed: [u8; 24],
    /// True if the key pair is used with compressed public keys.
    pub compress: bool,
    /// Address of the generated key pair on the informed network.
    pub address: String,
}

/// Information validated by a confirmation code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Confirmed {
    /// Serialized public key of the generated key pair.
    pub public_key: Vec<u8>,
    /// True if the key pair is used with compressed public keys.
    pub compress: bool,
    /// Address the confirmation code commits to.
    pub address: String,
    /// Lot and sequence numbers committed on creation.
    pub lot_sequence: Option<(u32, u16)>,
}

/// Internal functions to manipulate an arbitrary number of bytes [u8].
trait BytesManipulation {
    /// Encode informed data in base 58 check.
    fn encode_base58ck(&self) -> String;

    /// Sha256 and ripemd160 in sequence.
    fn hash160(&self) -> [u8; 20];

    /// Receives bytes and return 32 bytes of a dual sha256 hash.
    fn hash256(&self) -> [u8; 32];

    /// Create a p2pkh address for the informed network according to the
    /// number of bytes of the public key.
    fn p2pkh(&self, network: Network) -> Result<String, Error>;
}

/// Internal trait to manipulate private keys (32 bytes).
trait PrivateKeyManipulation {
    /// Generate secp256k1 point based on target secret key.
    fn public(&self, compress: bool) -> Result<Vec<u8>, Error>;
}

/// Internal functions to manipulate strings.
trait StringManipulation {
    /// Decode informed base 58 string into bytes (payload only).
    fn decode_base58ck(&self) -> Result<Vec<u8>, Error>;
}

impl BytesManipulation for [u8] {
    #[inline]
    fn encode_base58ck(&self) -> String {
        let mut decoded: Vec<u8> = self.to_vec();
        decoded.append(&mut decoded.hash256()[..4].to_vec());
        bs58::encode(decoded).into_string()
    }

    #[inline]
    fn hash160(&self) -> [u8; 20] {
        let mut result = [0x00; 20];
        result[..].copy_from_slice(
            &Ripemd160::digest(&sha2::Sha256::digest(self))
        );
        result
    }

    #[inline]
    fn hash256(&self) -> [u8; 32] {
        let mut result = [0x00; 32];
        result[..].copy_from_slice(
            &sha2::Sha256::digest(&sha2::Sha256::digest(self))
        );
        result
    }

    #[inline]
    fn p2pkh(&self, network: Network) -> Result<String, Error> {
        if self.len() != NBBY_PUBC && self.len() != NBBY_PUBU {
            return Err(Error::InvalidPoint);
        }
        let mut payload = vec![network.prefix_p2pkh()];
        payload.append(&mut self.hash160().to_vec());
        Ok(payload.encode_base58ck())
    }
}

impl PrivateKeyManipulation for [u8; 32] {
    #[inline]
    fn public(&self, compress: bool) -> Result<Vec<u8>, Error> {
        let secp_pub = PublicKey::from_secret_key(
            &Secp256k1::new(),
            &SecretKey::from_slice(self).map_err(|_| Error::InvalidKeyRange)?
        );

        if compress {
            Ok(secp_pub.serialize().to_vec())
        } else {
            Ok(secp_pub.serialize_uncompressed().to_vec())
        }
    }
}

impl StringManipulation for str {
    #[inline]
    fn decode_base58ck(&self) -> Result<Vec<u8>, Error> {
        let raw = bs58::decode(self).into_vec()
            .map_err(|_| Error::InvalidCharacter)?;
        if raw.len() < 5 {
            return Err(Error::InvalidLength);
        }
        if raw[raw.len() - 4..] != raw[..raw.len() - 4].hash256()[..4] {
            return Err(Error::InvalidChecksum);
        }
        Ok(raw[..raw.len() - 4].to_vec())
    }
}

/// Decrypt an encrypted private key with a passphrase, returning the wif of
/// the informed network. Handles both ec and non ec encrypted keys.
pub fn bip38_decrypt(
    encrypted_wif: &str,
    pass: &str,
    network: Network
) -> Result<String, Error> {
    Ok(bip38_decrypt_detailed(encrypted_wif, pass, network)?.wif)
}

/// Decrypt an encrypted private key with a passphrase, returning all
/// information recovered in the process.
pub fn bip38_decrypt_detailed(
    encrypted_wif: &str,
    pass: &str,
    network: Network
) -> Result<Decrypted, Error> {
    let payload = encrypted_wif.decode_base58ck()?;
    if payload.len() != 39 {
        return Err(Error::InvalidLength);
    }
    if payload[..2] == PRE_NON_EC {
        decrypt_non_ec(&payload, pass, network)
    } else if payload[..2] == PRE_EC {
        decrypt_ec(&payload, pass, network)
    } else {
        Err(Error::UnexpectedPrefix)
    }
}

/// Encrypt a private key in wif format with a passphrase (no ec multiply).
///
/// The result is deterministic: the same wif, passphrase and network always
/// produce the same encrypted key.
pub fn bip38_encrypt(
    wif: &str,
    pass: &str,
    network: Network
) -> Result<String, Error> {
    let (prvk, compress) = wif_to_private_key(wif, network)?;
    let pubk = prvk.public(compress)?;
    let address = pubk.p2pkh(network)?;
    let address_hash = &address.as_bytes().hash256()[..4];
    let mut scrypt_key = [0x00; 64];

    scrypt_strong(
        pass.nfc().collect::<String>().as_bytes(),
        address_hash,
        &mut scrypt_key
    )?;

    let mut half1 = [0x00; 32];
    half1[..].copy_from_slice(&scrypt_key[..32]);

    for idx in 0..32 {
        half1[idx] ^= prvk[idx];
    }

    let cipher = Aes256::new(GenericArray::from_slice(&scrypt_key[32..]));
    let mut part1 = GenericArray::clone_from_slice(&half1[..16]);
    let mut part2 = GenericArray::clone_from_slice(&half1[16..]);

    cipher.encrypt_block(&mut part1);
    cipher.encrypt_block(&mut part2);

    let mut buffer = [0x00; 39];
    buffer[..2].copy_from_slice(&PRE_NON_EC);
    buffer[2] = if compress { 0xe0 } else { 0xc0 };
    buffer[3..7].copy_from_slice(address_hash);
    buffer[7..23].copy_from_slice(&part1);
    buffer[23..].copy_from_slice(&part2);

    Ok(buffer.encode_base58ck())
}

/// Validate a confirmation code with the original passphrase, returning the
/// address committed to the generated key.
pub fn confirm_code(
    pass: &str,
    code: &str,
    network: Network
) -> Result<String, Error> {
    Ok(confirm_code_detailed(pass, code, network)?.address)
}

/// Validate a confirmation code with the original passphrase, returning all
/// information embedded on it.
pub fn confirm_code_detailed(
    pass: &str,
    code: &str,
    network: Network
) -> Result<Confirmed, Error> {
    let payload = code.decode_base58ck()?;
    if payload.len() != 51 {
        return Err(Error::InvalidLength);
    }
    if payload[..5] != PRE_CONF {
        return Err(Error::UnexpectedPrefix);
    }
    let flag = payload[5];
    if (flag & !0x24) != 0 {
        return Err(Error::UnsupportedFlag);
    }
    let compress = (flag & 0x20) == 0x20;
    let has_ls = (flag & 0x04) == 0x04;
    let owner_entropy = &payload[10..18];
    let encrypted_point_b = &payload[18..51];

    let pass_factor = recover_pass_factor(pass, owner_entropy, has_ls)?;
    let pass_point = pass_factor.public(true)?;

    let mut derived = [0x00; 64];
    scrypt_light(&pass_point, &payload[6..18], &mut derived)?;

    let cipher = Aes256::new(GenericArray::from_slice(&derived[32..]));
    let mut half1 = GenericArray::clone_from_slice(&encrypted_point_b[1..17]);
    let mut half2 = GenericArray::clone_from_slice(&encrypted_point_b[17..33]);

    cipher.decrypt_block(&mut half1);
    cipher.decrypt_block(&mut half2);

    for idx in 0..16 {
        half1[idx] ^= derived[idx];
        half2[idx] ^= derived[idx + 16];
    }

    let mut point_b = [0x00; 33];
    point_b[0] = encrypted_point_b[0] ^ (derived[63] & 0x01);
    point_b[1..17].copy_from_slice(&half1);
    point_b[17..].copy_from_slice(&half2);

    // a wrong passphrase almost always unwraps bytes off the curve
    let mut public_point = PublicKey::from_slice(&point_b)
        .map_err(|_| Error::BadPassphrase)?;

    public_point.mul_assign(&Secp256k1::new(), &pass_factor)
        .map_err(|_| Error::BadPassphrase)?;

    let pubk: Vec<u8> = if compress {
        public_point.serialize().to_vec()
    } else {
        public_point.serialize_uncompressed().to_vec()
    };

    let address = pubk.p2pkh(network)?;
    if address.as_bytes().hash256()[..4] != payload[6..10] {
        return Err(Error::BadPassphrase);
    }

    Ok(Confirmed {
        public_key: pubk,
        compress,
        address,
        lot_sequence: if has_ls {
            Some(embedded_lot_sequence(owner_entropy))
        } else {
            None
        },
    })
}

/// Generate a new encrypted private key out of an intermediate passphrase,
/// without knowledge of the passphrase itself.
///
/// The seed must have 24 bytes and is gathered from the operating system
/// random source when not informed.
pub fn create_new_encrypted_wif(
    intermediate: &str,
    compress: bool,
    seed: Option<&[u8]>,
    network: Network
) -> Result<Generated, Error> {
    let payload = intermediate.decode_base58ck()?;
    if payload.len() != 49 {
        return Err(Error::InvalidLength);
    }
    let has_ls = if payload[..8] == MAGIC_LS {
        true
    } else if payload[..8] == MAGIC_NO_LS {
        false
    } else {
        return Err(Error::UnexpectedPrefix);
    };
    let owner_entropy = &payload[8..16];
    let pass_point = &payload[16..49];

    let mut seed_b = [0x00; 24];
    match seed {
        Some(informed) => {
            if informed.len() != 24 {
                return Err(Error::InvalidSeedLength);
            }
            seed_b.copy_from_slice(informed);
        }
        None => rand::thread_rng().fill_bytes(&mut seed_b),
    }

    let factor_b = seed_b.hash256();

    let mut public_point = PublicKey::from_slice(pass_point)
        .map_err(|_| Error::InvalidPoint)?;

    public_point.mul_assign(&Secp256k1::new(), &factor_b)
        .map_err(|_| Error::InvalidKeyRange)?;

    let pubk: Vec<u8> = if compress {
        public_point.serialize().to_vec()
    } else {
        public_point.serialize_uncompressed().to_vec()
    };

    let address = pubk.p2pkh(network)?;
    let address_hash = &address.as_bytes().hash256()[..4];

    let mut salt = [0x00; 12];
    salt[..4].copy_from_slice(address_hash);
    salt[4..].copy_from_slice(owner_entropy);

    let mut derived = [0x00; 64];
    scrypt_light(pass_point, &salt, &mut derived)?;

    let cipher = Aes256::new(GenericArray::from_slice(&derived[32..]));

    let mut en_p1 = [0x00; 16];
    en_p1.copy_from_slice(&seed_b[..16]);

    for idx in 0..16 {
        en_p1[idx] ^= derived[idx];
    }

    let mut part1 = GenericArray::clone_from_slice(&en_p1);
    cipher.encrypt_block(&mut part1);

    let mut en_p2 = [0x00; 16];
    en_p2[..8].copy_from_slice(&part1[8..]);
    en_p2[8..].copy_from_slice(&seed_b[16..]);

    for idx in 0..16 {
        en_p2[idx] ^= derived[idx + 16];
    }

    let mut part2 = GenericArray::clone_from_slice(&en_p2);
    cipher.encrypt_block(&mut part2);

    let mut flag: u8 = if compress { 0x20 } else { 0x00 };
    if has_ls {
        flag |= 0x04;
    }

    let mut encrypted = [0x00; 39];
    encrypted[..2].copy_from_slice(&PRE_EC);
    encrypted[2] = flag;
    encrypted[3..7].copy_from_slice(address_hash);
    encrypted[7..15].copy_from_slice(owner_entropy);
    encrypted[15..23].copy_from_slice(&part1[..8]);
    encrypted[23..].copy_from_slice(&part2);

    let point_b = factor_b.public(true)?;

    let mut half1 = GenericArray::clone_from_slice(&point_b[1..17]);

    for idx in 0..16 {
        half1[idx] ^= derived[idx];
    }

    cipher.encrypt_block(&mut half1);

    let mut half2 = GenericArray::clone_from_slice(&point_b[17..33]);

    for idx in 0..16 {
        half2[idx] ^= derived[idx + 16];
    }

    cipher.encrypt_block(&mut half2);

    let mut code = [0x00; 51];
    code[..5].copy_from_slice(&PRE_CONF);
    code[5] = flag;
    code[6..10].copy_from_slice(address_hash);
    code[10..18].copy_from_slice(owner_entropy);
    code[18] = point_b[0] ^ (derived[63] & 0x01);
    code[19..35].copy_from_slice(&half1);
    code[35..].copy_from_slice(&half2);

    Ok(Generated {
        encrypted_wif: encrypted.encode_base58ck(),
        confirmation_code: code.encode_base58ck(),
        public_key: pubk,
        seed: seed_b,
        compress,
        address,
    })
}

/// Create an intermediate passphrase used to delegate key generation to a
/// third party, optionally committing to lot and sequence numbers.
///
/// The owner salt must have 8 bytes and is gathered from the operating
/// system random source when not informed. When lot and sequence are
/// informed only the first 4 bytes of the owner salt are used.
pub fn intermediate_code(
    pass: &str,
    owner_salt: Option<&[u8]>,
    lot_sequence: Option<(u32, u16)>
) -> Result<String, Error> {
    let mut salt = [0x00; 8];
    match owner_salt {
        Some(informed) => {
            if informed.len() != 8 {
                return Err(Error::InvalidOwnerSaltLength);
            }
            salt.copy_from_slice(informed);
        }
        None => rand::thread_rng().fill_bytes(&mut salt),
    }

    let mut payload = [0x00; 49];
    let mut owner_entropy = [0x00; 8];

    let pass_factor = match lot_sequence {
        Some((lot, sequence)) => {
            if lot > MAX_LOT {
                return Err(Error::InvalidLot);
            }
            if sequence > MAX_SEQ {
                return Err(Error::InvalidSequence);
            }
            let mut pre_factor = [0x00; 32];

            scrypt_strong(
                pass.nfc().collect::<String>().as_bytes(),
                &salt[..4],
                &mut pre_factor
            )?;

            owner_entropy[..4].copy_from_slice(&salt[..4]);
            owner_entropy[4..].copy_from_slice(
                &(lot * 4096 + sequence as u32).to_be_bytes()
            );

            let mut data = [0x00; 40];
            data[..32].copy_from_slice(&pre_factor);
            data[32..].copy_from_slice(&owner_entropy);

            payload[..8].copy_from_slice(&MAGIC_LS);
            data.hash256()
        }
        None => {
            let mut pass_factor = [0x00; 32];

            scrypt_strong(
                pass.nfc().collect::<String>().as_bytes(),
                &salt,
                &mut pass_factor
            )?;

            owner_entropy.copy_from_slice(&salt);
            payload[..8].copy_from_slice(&MAGIC_NO_LS);
            pass_factor
        }
    };

    let pass_point = pass_factor.public(true)?;
    payload[8..16].copy_from_slice(&owner_entropy);
    payload[16..].copy_from_slice(&pass_point);

    Ok(payload.encode_base58ck())
}

/// Derive the serialized public key of a raw private key.
pub fn private_key_to_public_key(
    private_key: &[u8; 32],
    compress: bool
) -> Result<Vec<u8>, Error> {
    private_key.public(compress)
}

/// Encode a raw private key in wallet import format for the informed
/// network.
pub fn private_key_to_wif(
    private_key: &[u8; 32],
    compress: bool,
    network: Network
) -> Result<String, Error> {
    SecretKey::from_slice(private_key).map_err(|_| Error::InvalidKeyRange)?;

    let mut payload = vec![network.prefix_wif()];
    payload.extend_from_slice(private_key);
    if compress {
        payload.push(0x01);
    }

    Ok(payload.encode_base58ck())
}

/// Derive the Qtum address of a serialized public key (compressed or
/// uncompressed) on the informed network.
pub fn public_key_to_address(
    public_key: &[u8],
    network: Network
) -> Result<String, Error> {
    public_key.p2pkh(network)
}

/// Identify the network of a wif string based on its version byte.
pub fn wif_network(wif: &str) -> Result<Network, Error> {
    let raw = wif.decode_base58ck()?;
    if raw.len() != 33 && raw.len() != 34 {
        return Err(Error::InvalidLength);
    }
    if raw[0] == Network::Mainnet.prefix_wif() {
        Ok(Network::Mainnet)
    } else if raw[0] == Network::Testnet.prefix_wif() {
        Ok(Network::Testnet)
    } else {
        Err(Error::NetworkMismatch)
    }
}

/// Decode a wif string of the informed network into a raw private key,
/// indicating if it represents a compressed public key.
pub fn wif_to_private_key(
    wif: &str,
    network: Network
) -> Result<([u8; 32], bool), Error> {
    let raw = wif.decode_base58ck()?;
    let compress = match raw.len() {
        33 => false,
        34 => true,
        _ => return Err(Error::InvalidLength),
    };
    if raw[0] != network.prefix_wif() {
        return Err(Error::NetworkMismatch);
    }
    if compress && raw[33] != 0x01 {
        return Err(Error::UnsupportedFlag);
    }

    let mut prvk = [0x00; 32];
    prvk[..].copy_from_slice(&raw[1..33]);

    SecretKey::from_slice(&prvk).map_err(|_| Error::InvalidKeyRange)?;

    Ok((prvk, compress))
}

/// Decrypt the payload of an encrypted private key in ec multiply mode.
fn decrypt_ec(
    payload: &[u8],
    pass: &str,
    network: Network
) -> Result<Decrypted, Error> {
    let flag = payload[2];
    if (flag & !0x24) != 0 {
        return Err(Error::UnsupportedFlag);
    }
    let compress = (flag & 0x20) == 0x20;
    let has_ls = (flag & 0x04) == 0x04;
    let owner_entropy = &payload[7..15];

    let pass_factor = recover_pass_factor(pass, owner_entropy, has_ls)?;
    let pass_point = pass_factor.public(true)?;

    let mut derived = [0x00; 64];
    scrypt_light(&pass_point, &payload[3..15], &mut derived)?;

    let cipher = Aes256::new(GenericArray::from_slice(&derived[32..]));
    let mut part2 = GenericArray::clone_from_slice(&payload[23..39]);

    cipher.decrypt_block(&mut part2);

    for idx in 0..16 {
        part2[idx] ^= derived[idx + 16];
    }

    let mut tmp = [0x00; 16];
    tmp[..8].copy_from_slice(&payload[15..23]);
    tmp[8..].copy_from_slice(&part2[..8]);

    let mut part1 = GenericArray::clone_from_slice(&tmp);

    cipher.decrypt_block(&mut part1);

    for idx in 0..16 {
        part1[idx] ^= derived[idx];
    }

    let mut seed_b = [0x00; 24];
    seed_b[..16].copy_from_slice(&part1);
    seed_b[16..].copy_from_slice(&part2[8..]);

    let factor_b = seed_b.hash256();

    let mut prv = SecretKey::from_slice(&pass_factor)
        .map_err(|_| Error::InvalidKeyRange)?;

    prv.mul_assign(&factor_b).map_err(|_| Error::InvalidKeyRange)?;

    let mut prvk = [0x00; 32];
    prvk[..].copy_from_slice(&prv[..]);

    let pubk = prvk.public(compress)?;
    let address = pubk.p2pkh(network)?;
    if address.as_bytes().hash256()[..4] != payload[3..7] {
        return Err(Error::BadPassphrase);
    }

    Ok(Decrypted {
        wif: private_key_to_wif(&prvk, compress, network)?,
        private_key: prvk,
        compress,
        public_key: pubk,
        seed: Some(seed_b),
        address,
        lot_sequence: if has_ls {
            Some(embedded_lot_sequence(owner_entropy))
        } else {
            None
        },
    })
}

/// Decrypt the payload of a non ec encrypted private key.
fn decrypt_non_ec(
    payload: &[u8],
    pass: &str,
    network: Network
) -> Result<Decrypted, Error> {
    let flag = payload[2];
    if flag != 0xc0 && flag != 0xe0 {
        return Err(Error::UnsupportedFlag);
    }
    let compress = (flag & 0x20) == 0x20;
    let mut scrypt_key = [0x00; 64];

    scrypt_strong(
        pass.nfc().collect::<String>().as_bytes(),
        &payload[3..7],
        &mut scrypt_key
    )?;

    let cipher = Aes256::new(GenericArray::from_slice(&scrypt_key[32..]));
    let mut part1 = GenericArray::clone_from_slice(&payload[7..23]);
    let mut part2 = GenericArray::clone_from_slice(&payload[23..39]);

    cipher.decrypt_block(&mut part1);
    cipher.decrypt_block(&mut part2);

    for idx in 0..16 {
        part1[idx] ^= scrypt_key[idx];
        part2[idx] ^= scrypt_key[idx + 16];
    }

    let mut prvk = [0x00; 32];
    prvk[..16].copy_from_slice(&part1);
    prvk[16..].copy_from_slice(&part2);

    let pubk = prvk.public(compress)?;
    let address = pubk.p2pkh(network)?;
    if address.as_bytes().hash256()[..4] != payload[3..7] {
        return Err(Error::BadPassphrase);
    }

    Ok(Decrypted {
        wif: private_key_to_wif(&prvk, compress, network)?,
        private_key: prvk,
        compress,
        public_key: pubk,
        seed: None,
        address,
        lot_sequence: None,
    })
}

/// Decode the lot and sequence numbers embedded on owner entropy.
fn embedded_lot_sequence(owner_entropy: &[u8]) -> (u32, u16) {
    let mut raw = [0x00; 4];
    raw.copy_from_slice(&owner_entropy[4..]);
    let number = u32::from_be_bytes(raw);
    (number >> 12, (number & 0x0fff) as u16)
}

/// Recover the pass factor of a passphrase given the owner entropy of an
/// encrypted key or confirmation code.
fn recover_pass_factor(
    pass: &str,
    owner_entropy: &[u8],
    has_ls: bool
) -> Result<[u8; 32], Error> {
    let owner_salt = if has_ls { &owner_entropy[..4] } else { owner_entropy };
    let mut pass_factor = [0x00; 32];

    scrypt_strong(
        pass.nfc().collect::<String>().as_bytes(),
        owner_salt,
        &mut pass_factor
    )?;

    if has_ls {
        let mut data = [0x00; 40];
        data[..32].copy_from_slice(&pass_factor);
        data[32..].copy_from_slice(owner_entropy);
        pass_factor = data.hash256();
    }

    Ok(pass_factor)
}

/// Key derivation with the light set of scrypt parameters.
fn scrypt_light(pass: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), Error> {
    scrypt::scrypt(
        pass,
        salt,
        &Params::new(10, 1, 1).map_err(|_| Error::Scrypt)?, // 1024 log2 = 10
        out
    ).map_err(|_| Error::Scrypt)
}

/// Key derivation with the strong set of scrypt parameters.
fn scrypt_strong(pass: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), Error> {
    scrypt::scrypt(
        pass,
        salt,
        &Params::new(14, 8, 8).map_err(|_| Error::Scrypt)?, // 16384 log2 = 14
        out
    ).map_err(|_| Error::Scrypt)
}
