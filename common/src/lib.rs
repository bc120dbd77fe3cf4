/// Arbitrary-precision modular arithmetic over FFT-friendly primes. Every
/// operation goes through an explicit [`field::FieldCtx`] so that concurrent
/// sessions over different primes never share mutable state.
pub mod field;

/// Dense univariate polynomial arithmetic over a prime field, including an
/// NTT-based multiplication for the FFT-friendly moduli in the prime table.
pub mod poly;

/// Additive 2-basis message encoding, the decompression circuit, and the
/// random-linear-combination format-verification predicate.
pub mod basis;

/// Packed Shamir sharing, Vandermonde expansion, and Gao's variant of the
/// Berlekamp–Welch Reed–Solomon decoder.
pub mod share;

/// Tangent-Graeffe root finding and Newton's-identity conversion from power
/// sums to a monic symmetric polynomial.
pub mod roots;
