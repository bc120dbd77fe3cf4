//! Additive 2-basis encoding of a message `m` as the power vector
//! `[m^b for b in basis]`, together with the decompression circuit that
//! rebuilds `[m^1 .. m^N]` from quadratic products of the encoding, and the
//! format-verification predicate that vanishes exactly on well-formed
//! encodings.

use crate::field::{Fe, FieldCtx};
use num_traits::Zero;

/// Length of an encoding for parameter `l`.
pub fn encoding_len(l: usize) -> usize {
    7 * l + 5
}

/// Number of coins consumed by one format verification.
pub fn num_coins(l: usize) -> usize {
    7 * l + 4
}

/// Number of messages mixed per epoch, `14l^2 + 10l - 1`.
pub fn num_messages(l: usize) -> usize {
    14 * l * l + 10 * l - 1
}

/// The basis exponents: five arithmetic progressions plus three standalone
/// values, `7l + 5` in total.
pub fn basis_exponents(l: usize) -> Vec<u64> {
    let lu = l as u64;
    let mut basis = Vec::with_capacity(encoding_len(l));
    let mut a = 0u64;
    for _ in 0..l {
        a += 1;
        basis.push(a);
    }
    a = lu;
    for _ in 0..3 * l {
        a += lu;
        basis.push(a);
    }
    a = 3 * lu * lu + lu - 1;
    for _ in 0..l {
        a += lu + 1;
        basis.push(a);
    }
    a = 6 * lu * lu + 4 * lu - 1;
    for _ in 0..l + 1 {
        a += 1;
        basis.push(a);
    }
    a = 10 * lu * lu + 7 * lu - 1;
    for _ in 0..l + 1 {
        a += 1;
        basis.push(a);
    }
    basis.push(lu + 1);
    basis.push(6 * lu * lu + 4 * lu - 1);
    basis.push(10 * lu * lu + 7 * lu - 1);
    basis
}

/// Encodes a message as the vector of its basis powers.
pub fn encode(ctx: &FieldCtx, msg: &Fe, l: usize) -> Vec<Fe> {
    basis_exponents(l)
        .into_iter()
        .map(|b| ctx.pow_u64(msg, b))
        .collect()
}

/// The decompression circuit: a fixed schedule of pairwise products that
/// expands an encoding of length `7l + 5` into the full power vector of
/// length `14l^2 + 10l - 1`. Applied to shares coordinate-wise it produces
/// degree-2t shares of the same powers.
pub fn decompress(ctx: &FieldCtx, input: &[Fe], l: usize) -> Vec<Fe> {
    assert_eq!(input.len(), encoding_len(l));
    let n = num_messages(l);
    let mut out = Vec::with_capacity(n);
    let prod = |i: usize, j: usize| ctx.mul(&input[i], &input[j]);

    for i in 0..l {
        out.push(input[i].clone());
    }
    for i in 0..l {
        out.push(prod(l - 1, i));
    }
    for j in l..4 * l {
        for i in 0..l {
            out.push(prod(i, j));
        }
    }
    for j in 4 * l..5 * l {
        if j > 4 * l {
            out.push(input[j].clone());
        }
        for i in 0..l {
            out.push(prod(i, j));
        }
    }
    for i in 1..2 * l + 2 {
        for j in 1..l + 1 {
            out.push(prod((2 * l - 1) + i - j, 4 * l + j - 1));
        }
    }
    for i in 5 * l..6 * l + 1 {
        out.push(input[i].clone());
    }
    for i in 0..l {
        out.push(prod(i, 6 * l));
    }
    for i in l..4 * l {
        for j in 5 * l + 1..6 * l + 1 {
            out.push(prod(i, j));
        }
    }
    for j in 5 * l + 1..6 * l + 1 {
        out.push(prod(4 * l, j));
    }
    for i in 4 * l + 1..5 * l {
        for j in 5 * l..6 * l + 1 {
            out.push(prod(i, j));
        }
    }
    for i in 6 * l + 1..7 * l + 2 {
        out.push(input[i].clone());
    }
    for i in 0..l {
        out.push(prod(i, 7 * l + 1));
    }
    for i in l..4 * l {
        for j in 6 * l + 2..7 * l + 2 {
            out.push(prod(i, j));
        }
    }
    for i in 6 * l + 2..7 * l + 2 {
        out.push(prod(4 * l, i));
    }
    for i in 4 * l + 1..5 * l {
        for j in 6 * l + 1..7 * l + 2 {
            out.push(prod(i, j));
        }
    }
    assert_eq!(out.len(), n);
    out
}

/// Random linear combination of the quadratic consistency constraints that
/// characterise a valid encoding. The result is zero for every coin vector
/// exactly when `input` encodes some message.
pub fn verify_format(ctx: &FieldCtx, coins: &[Fe], input: &[Fe], l: usize) -> Fe {
    assert_eq!(input.len(), encoding_len(l));
    assert_eq!(coins.len(), num_coins(l));
    let mut pred = Fe::zero();
    let mut idx = 0;
    // coin * (input[a] - input[b] * input[c])
    let mut term = |pred: &mut Fe, a: usize, b: usize, c: usize| {
        let q = ctx.sub(&input[a], &ctx.mul(&input[b], &input[c]));
        *pred = ctx.add(pred, &ctx.mul(&coins[idx], &q));
        idx += 1;
    };

    for i in 0..l - 1 {
        term(&mut pred, i + 1, i, 0);
    }
    for i in l..4 * l - 1 {
        term(&mut pred, i + 1, i, l - 1);
    }
    for i in 4 * l..5 * l - 1 {
        term(&mut pred, i + 1, i, 7 * l + 2);
    }
    term(&mut pred, 7 * l + 2, 0, l - 1);
    for i in 5 * l..6 * l {
        term(&mut pred, i + 1, 0, i);
    }
    for i in 6 * l + 1..7 * l + 1 {
        term(&mut pred, i + 1, 0, i);
    }
    term(&mut pred, l, l - 1, l - 1);
    term(&mut pred, 4 * l, 4 * l - 1, l - 1);
    term(&mut pred, 5 * l, 7 * l + 3, 0);
    term(&mut pred, 7 * l + 3, 3 * l, 5 * l - 1);
    term(&mut pred, 6 * l + 1, 7 * l + 4, 0);
    term(&mut pred, 7 * l + 4, 5 * l - 1, 6 * l);
    pred
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ctx() -> FieldCtx {
        FieldCtx::from_bit_length(32).unwrap()
    }

    #[test]
    fn basis_has_expected_length() {
        for l in 1..=9 {
            assert_eq!(basis_exponents(l).len(), encoding_len(l));
        }
    }

    #[test]
    fn decompression_yields_consecutive_powers() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(23);
        for l in 1..=3 {
            let m = ctx.random(&mut rng);
            let code = encode(&ctx, &m, l);
            let powers = decompress(&ctx, &code, l);
            assert_eq!(powers.len(), num_messages(l));
            for (k, p) in powers.iter().enumerate() {
                assert_eq!(*p, ctx.pow_u64(&m, (k + 1) as u64), "power {}", k + 1);
            }
        }
    }

    #[test]
    fn predicate_vanishes_on_valid_encodings() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(29);
        for l in 1..=4 {
            let m = ctx.random(&mut rng);
            let code = encode(&ctx, &m, l);
            let coins: Vec<_> = (0..num_coins(l)).map(|_| ctx.random(&mut rng)).collect();
            assert!(verify_format(&ctx, &coins, &code, l).is_zero());
        }
    }

    #[test]
    fn predicate_catches_malformed_vectors() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(31);
        for l in 1..=4 {
            let junk: Vec<_> = (0..encoding_len(l)).map(|_| ctx.random(&mut rng)).collect();
            let mut hits = 0;
            for _ in 0..8 {
                let coins: Vec<_> = (0..num_coins(l)).map(|_| ctx.random(&mut rng)).collect();
                if !verify_format(&ctx, &coins, &junk, l).is_zero() {
                    hits += 1;
                }
            }
            // a random vector fails at least one constraint, so almost every
            // coin vector produces a nonzero combination
            assert!(hits >= 7, "l = {l}: only {hits} of 8 draws were nonzero");
        }
    }

    #[test]
    fn corrupting_one_coordinate_is_detected() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(37);
        let l = 2;
        let m = ctx.random(&mut rng);
        let mut code = encode(&ctx, &m, l);
        code[3] = ctx.add(&code[3], &ctx.from_u64(1));
        let coins: Vec<_> = (0..num_coins(l)).map(|_| ctx.random(&mut rng)).collect();
        assert!(!verify_format(&ctx, &coins, &code, l).is_zero());
    }
}
