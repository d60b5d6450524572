//! Key hashing for shard selection.
//!
//! A map routes every key with `hash_key(key) & (shard_count - 1)`, so the
//! hasher only needs to spread bits well enough that the low bits are useful.
//! [`TypeHasher`] is the default strategy: it picks a hash based on the key's
//! type through the [`ShardKey`] trait. Key types without a `ShardKey` impl
//! are rejected at compile time rather than at hash time.

use std::borrow::Cow;
use std::fmt::{self, Display, Write as _};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

const FNV64_OFFSET: u64 = 14_695_981_039_346_656_037;
const FNV64_PRIME: u64 = 1_099_511_628_211;

const PRIME64_2: u64 = 14_029_467_366_897_019_727;
const PRIME64_3: u64 = 1_609_587_929_392_839_161;

/// Running FNV-1 state, fed in pieces.
struct Fnv64(u64);

impl Fnv64 {
    #[inline]
    fn new() -> Self {
        Fnv64(FNV64_OFFSET)
    }

    #[inline]
    fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_mul(FNV64_PRIME);
            self.0 ^= u64::from(b);
        }
    }
}

impl fmt::Write for Fnv64 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.feed(s.as_bytes());
        Ok(())
    }
}

/// 64-bit FNV-1 hash of a byte string.
#[inline]
pub fn fnv64(bytes: &[u8]) -> u64 {
    let mut state = Fnv64::new();
    state.feed(bytes);
    state.0
}

/// Avalanche mix borrowed from xxhash's 64-bit finalizer.
///
/// Sequential integers come out with unrelated low bits, so they don't
/// cluster into the first few shards.
#[inline]
pub fn mix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(PRIME64_2);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME64_3);
    h ^= h >> 32;
    h
}

/// A key type that knows how to hash itself for shard selection.
///
/// Implemented for strings, byte strings, integers, floats, `bool`, `char`
/// and every [`Hashable`] type.
pub trait ShardKey {
    /// The 64-bit routing hash of this key.
    fn shard_hash(&self) -> u64;
}

/// A key type that provides its own hash.
///
/// The returned value is passed through [`mix64`] before routing, so a plain
/// identifier is a perfectly good `hash64`.
///
/// ```rust
/// use cmap::hash::{Hashable, ShardKey, mix64};
///
/// #[derive(Hash, PartialEq, Eq)]
/// struct UserId(u32);
///
/// impl Hashable for UserId {
///     fn hash64(&self) -> u64 {
///         u64::from(self.0)
///     }
/// }
///
/// assert_eq!(UserId(7).shard_hash(), mix64(7));
/// ```
pub trait Hashable {
    /// The type's own hash value.
    fn hash64(&self) -> u64;
}

impl<T: Hashable + ?Sized> ShardKey for T {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64(self.hash64())
    }
}

macro_rules! int_shard_key {
    ($($t:ty),* $(,)?) => {
        $(
            impl ShardKey for $t {
                #[inline]
                fn shard_hash(&self) -> u64 {
                    mix64(*self as u64)
                }
            }
        )*
    };
}

int_shard_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl ShardKey for u128 {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64((*self as u64) ^ ((*self >> 64) as u64))
    }
}

impl ShardKey for i128 {
    #[inline]
    fn shard_hash(&self) -> u64 {
        (*self as u128).shard_hash()
    }
}

impl ShardKey for bool {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64(u64::from(*self))
    }
}

impl ShardKey for char {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64(u64::from(u32::from(*self)))
    }
}

impl ShardKey for f32 {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64(u64::from(self.to_bits()))
    }
}

impl ShardKey for f64 {
    #[inline]
    fn shard_hash(&self) -> u64 {
        mix64(self.to_bits())
    }
}

/// A float usable as a map key.
///
/// Bare `f32`/`f64` are neither `Eq` nor `Hash`, so they cannot key a map.
/// `FloatKey` compares and hashes by IEEE bit pattern: `NaN` equals a `NaN`
/// with the same bits, and `0.0` and `-0.0` are different keys.
///
/// ```rust
/// use cmap::hash::FloatKey;
/// use cmap::ShardedMap;
///
/// let map = ShardedMap::new();
/// map.set(FloatKey(1.5f64), "one and a half");
/// assert_eq!(*map.get(&FloatKey(1.5)).unwrap(), "one and a half");
/// assert!(map.get(&FloatKey(-1.5)).is_none());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatKey<F>(pub F);

macro_rules! float_key {
    ($($t:ty),* $(,)?) => {
        $(
            impl PartialEq for FloatKey<$t> {
                #[inline]
                fn eq(&self, other: &Self) -> bool {
                    self.0.to_bits() == other.0.to_bits()
                }
            }

            impl Eq for FloatKey<$t> {}

            impl Hash for FloatKey<$t> {
                #[inline]
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.0.to_bits().hash(state);
                }
            }

            impl ShardKey for FloatKey<$t> {
                #[inline]
                fn shard_hash(&self) -> u64 {
                    self.0.shard_hash()
                }
            }

            impl From<$t> for FloatKey<$t> {
                #[inline]
                fn from(value: $t) -> Self {
                    FloatKey(value)
                }
            }
        )*
    };
}

float_key!(f32, f64);

impl ShardKey for str {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for &str {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for String {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for Box<str> {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for Arc<str> {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for Rc<str> {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for Cow<'_, str> {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self.as_bytes())
    }
}

impl ShardKey for [u8] {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self)
    }
}

impl ShardKey for Vec<u8> {
    #[inline]
    fn shard_hash(&self) -> u64 {
        fnv64(self)
    }
}

/// Strategy used by a map to turn a key into a routing hash.
///
/// Any `Fn(&K) -> u64 + Send + Sync` closure is a strategy, so a custom
/// hash function can be passed straight to
/// [`ShardedMap::with_hasher`](crate::ShardedMap::with_hasher).
pub trait KeyHasher<K: ?Sized>: Send + Sync {
    /// Hash a key to determine which shard it belongs to.
    fn hash_key(&self, key: &K) -> u64;
}

impl<K: ?Sized, F> KeyHasher<K> for F
where
    F: Fn(&K) -> u64 + Send + Sync,
{
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        self(key)
    }
}

/// Default strategy: dispatch on the key type through [`ShardKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeHasher;

impl<K: ShardKey + ?Sized> KeyHasher<K> for TypeHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        key.shard_hash()
    }
}

/// ahash over the key's `Hash` impl. Works for any `Hash` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AHashHasher;

impl<K: Hash + ?Sized> KeyHasher<K> for AHashHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = ahash::AHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// FNV-1 over the key's `Display` output.
///
/// For key types that print themselves but have neither a built-in
/// [`ShardKey`] impl nor a [`Hashable`] one. The output is streamed into the
/// hash, nothing is allocated, and a key hashes the same as its
/// `to_string()` would under [`TypeHasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayHasher;

impl<K: Display + ?Sized> KeyHasher<K> for DisplayHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        let mut state = Fnv64::new();
        // Fnv64 never fails; only a broken Display impl can.
        let _ = write!(state, "{}", key);
        state.0
    }
}

/// fxhash over the key's `Hash` impl (faster but potentially less distributed).
#[cfg(feature = "fxhash")]
#[derive(Debug, Clone, Copy, Default)]
pub struct FxHashHasher;

#[cfg(feature = "fxhash")]
impl<K: Hash + ?Sized> KeyHasher<K> for FxHashHasher {
    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = fxhash::FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv64_known_values() {
        assert_eq!(fnv64(b""), FNV64_OFFSET);
        // FNV-1 (multiply then xor) of "a".
        assert_eq!(fnv64(b"a"), 0xaf63_bd4c_8601_b7be);
    }

    #[test]
    fn test_string_types_agree() {
        let owned = String::from("shard");
        let boxed: Box<str> = owned.clone().into_boxed_str();
        let shared: Arc<str> = Arc::from("shard");
        let cow: Cow<'_, str> = Cow::Borrowed("shard");

        let expected = "shard".shard_hash();
        assert_eq!(owned.shard_hash(), expected);
        assert_eq!(boxed.shard_hash(), expected);
        assert_eq!(shared.shard_hash(), expected);
        assert_eq!(cow.shard_hash(), expected);
        assert_eq!(b"shard"[..].shard_hash(), expected);
    }

    #[test]
    fn test_integer_widths_agree() {
        assert_eq!(7u8.shard_hash(), 7u64.shard_hash());
        assert_eq!(7i32.shard_hash(), 7usize.shard_hash());
        assert_eq!(7u128.shard_hash(), 7u64.shard_hash());
    }

    #[test]
    fn test_sequential_integers_spread() {
        let mut used = [false; 16];
        for i in 0u64..64 {
            used[(i.shard_hash() & 15) as usize] = true;
        }
        assert!(used.iter().filter(|&&u| u).count() > 8);
    }

    #[test]
    fn test_floats_hash_bits() {
        assert_eq!(1.5f64.shard_hash(), mix64(1.5f64.to_bits()));
        assert_ne!(0.0f64.shard_hash(), (-0.0f64).shard_hash());
    }

    #[test]
    fn test_float_keys_compare_by_bits() {
        assert_eq!(FloatKey(1.5f64), FloatKey::from(1.5f64));
        assert_ne!(FloatKey(0.0f64), FloatKey(-0.0f64));
        assert_eq!(FloatKey(f64::NAN), FloatKey(f64::NAN));
        assert_eq!(FloatKey(2.5f32).shard_hash(), 2.5f32.shard_hash());
    }

    #[test]
    fn test_display_hasher_matches_string_hash() {
        struct Version(u32, u32);

        impl Display for Version {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "v{}.{}", self.0, self.1)
            }
        }

        assert_eq!(DisplayHasher.hash_key(&Version(1, 20)), "v1.20".shard_hash());
        assert_eq!(DisplayHasher.hash_key(&42u32), fnv64(b"42"));
    }

    #[test]
    fn test_closure_strategy() {
        let strategy = |k: &u64| *k;
        assert_eq!(strategy.hash_key(&42), 42);
    }

    #[test]
    fn test_ahash_deterministic() {
        let a = AHashHasher.hash_key(&"key");
        let b = AHashHasher.hash_key(&"key");
        assert_eq!(a, b);
    }
}
