use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;
use thiserror::Error;

/// A field element. Values are kept reduced modulo the session prime by the
/// [`FieldCtx`] that produced them.
pub type Fe = BigUint;

/// Error that occurs inside the field/polynomial kernel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The prime table has no entry for the requested bit length.
    #[error("no FFT-friendly prime registered for bit length {0}")]
    UnknownPrimeLength(u32),
    /// Zero was passed where an invertible element is required.
    #[error("zero has no multiplicative inverse")]
    ZeroInverse,
    /// Interpolation was attempted through a repeated x-coordinate.
    #[error("interpolation points must be distinct")]
    RepeatedPoint,
    /// The x and y coordinate lists have different lengths.
    #[error("mismatched point list lengths")]
    MismatchedPoints,
    /// Polynomial division by the zero polynomial.
    #[error("division by the zero polynomial")]
    ZeroDivisor,
}

/// An FFT-friendly prime `p = odd_factor * 2^two_exponent + 1` together with
/// a primitive root `zeta` of order at least `2^two_exponent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeInfo {
    pub prime: BigUint,
    pub zeta: u32,
    pub odd_factor: u32,
    pub two_exponent: u32,
}

impl PrimeInfo {
    /// Looks up the closed table of supported prime bit lengths. The labels
    /// are nominal; the actual modulus is `odd_factor << two_exponent | 1`.
    pub fn from_bit_length(bits: u32) -> Result<Self, FieldError> {
        let (zeta, odd_factor, two_exponent) = match bits {
            32 => (3, 101, 27),
            40 => (3, 125, 35),
            64 => (7, 129, 59),
            128 => (3, 101, 123),
            256 => (7, 507, 251),
            384 => (10, 159, 379),
            512 => (10, 267, 508),
            640 => (3, 275, 635),
            768 => (3, 635, 763),
            896 => (3, 223, 892),
            1024 => (3, 755, 1019),
            1152 => (3, 149, 1147),
            1280 => (5, 339, 1275),
            1408 => (3, 539, 1403),
            1536 => (7, 471, 1531),
            1664 => (3, 865, 1662),
            1792 => (23, 321, 1787),
            1920 => (5, 203, 1917),
            2048 => (3, 203, 2045),
            3072 => (7, 675, 3068),
            4096 => (3, 251, 4097),
            _ => return Err(FieldError::UnknownPrimeLength(bits)),
        };
        let prime = (BigUint::from(odd_factor) << two_exponent) + 1u32;
        Ok(Self {
            prime,
            zeta,
            odd_factor,
            two_exponent,
        })
    }
}

/// Modular arithmetic context for one session. The modulus is fixed at
/// construction; sessions over different primes each capture their own
/// context instead of sharing a process-wide one.
#[derive(Debug, Clone)]
pub struct FieldCtx {
    info: PrimeInfo,
    bits: u64,
    width: usize,
}

impl FieldCtx {
    pub fn new(info: PrimeInfo) -> Self {
        let bits = info.prime.bits();
        let width = bits.div_ceil(8) as usize;
        Self { info, bits, width }
    }

    pub fn from_bit_length(bits: u32) -> Result<Self, FieldError> {
        Ok(Self::new(PrimeInfo::from_bit_length(bits)?))
    }

    pub fn info(&self) -> &PrimeInfo {
        &self.info
    }

    pub fn prime(&self) -> &BigUint {
        &self.info.prime
    }

    /// Bit length of the modulus.
    pub fn modulus_bits(&self) -> u64 {
        self.bits
    }

    /// Fixed byte width of a serialised element, `ceil(bits(p) / 8)`.
    pub fn element_width(&self) -> usize {
        self.width
    }

    pub fn reduce(&self, v: BigUint) -> Fe {
        v % self.prime()
    }

    pub fn from_u64(&self, v: u64) -> Fe {
        self.reduce(BigUint::from(v))
    }

    pub fn add(&self, a: &Fe, b: &Fe) -> Fe {
        let mut s = a + b;
        if s >= *self.prime() {
            s -= self.prime();
        }
        s
    }

    pub fn sub(&self, a: &Fe, b: &Fe) -> Fe {
        if a >= b {
            a - b
        } else {
            self.prime() - b + a
        }
    }

    pub fn neg(&self, a: &Fe) -> Fe {
        if a.is_zero() {
            Fe::zero()
        } else {
            self.prime() - a
        }
    }

    pub fn mul(&self, a: &Fe, b: &Fe) -> Fe {
        (a * b) % self.prime()
    }

    /// Multiplicative inverse via Fermat's little theorem.
    pub fn inv(&self, a: &Fe) -> Result<Fe, FieldError> {
        if a.is_zero() {
            return Err(FieldError::ZeroInverse);
        }
        Ok(a.modpow(&(self.prime() - 2u32), self.prime()))
    }

    pub fn pow(&self, a: &Fe, e: &BigUint) -> Fe {
        a.modpow(e, self.prime())
    }

    pub fn pow_u64(&self, a: &Fe, e: u64) -> Fe {
        a.modpow(&BigUint::from(e), self.prime())
    }

    /// Uniform element below the modulus.
    pub fn random(&self, rng: &mut impl Rng) -> Fe {
        rng.gen_biguint_below(self.prime())
    }

    /// Uniform `bits`-bit integer reduced into the field.
    pub fn random_bits(&self, rng: &mut impl Rng, bits: u64) -> Fe {
        self.reduce(rng.gen_biguint(bits))
    }
}
