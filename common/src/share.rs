//! Packed Shamir sharing and robust reconstruction. Shares are evaluations
//! at the fixed x-values `1..=n`; reconstruction uses Gao's variant of the
//! Berlekamp–Welch decoder so that up to `(n - d) / 2` corrupted shares are
//! located and corrected.

use crate::field::{Fe, FieldCtx};
use crate::poly;
use itertools::Itertools;
use num_traits::{One, Zero};
use rand::Rng;
use thiserror::Error;

/// Error that occurs while producing shares.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodingError {
    /// The packed block does not fit: `2 (t + |msgs| - 1)` must stay below
    /// the number of share points.
    #[error("cannot pack {msgs} secrets at threshold {t} into {n} shares")]
    BlockTooLarge { msgs: usize, t: usize, n: usize },
}

/// The canonical evaluation points `1, 2, ..., n`.
pub fn gen_xvals(ctx: &FieldCtx, n: usize) -> Vec<Fe> {
    (1..=n as u64).map(|i| ctx.from_u64(i)).collect()
}

/// `n x (d + 1)` Vandermonde matrix with rows `(i + 1)^j`.
pub fn vandermonde(ctx: &FieldCtx, n: usize, d: usize) -> Vec<Vec<Fe>> {
    (0..n)
        .map(|i| {
            let x = ctx.from_u64(i as u64 + 1);
            let mut pow = Fe::one();
            (0..=d)
                .map(|_| {
                    let entry = pow.clone();
                    pow = ctx.mul(&pow, &x);
                    entry
                })
                .collect()
        })
        .collect()
}

/// Matrix-vector product `V * block`.
pub fn apply_vandermonde(ctx: &FieldCtx, matrix: &[Vec<Fe>], block: &[Fe]) -> Vec<Fe> {
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .zip_eq(block.iter())
                .fold(Fe::zero(), |acc, (a, b)| ctx.add(&acc, &ctx.mul(a, b)))
        })
        .collect()
}

/// Packed Shamir sharing: a degree `t + |msgs| - 1` polynomial whose low
/// coefficients are the secrets and whose remaining coefficients are
/// uniform, evaluated at `xvals`.
pub fn packed_share(
    ctx: &FieldCtx,
    xvals: &[Fe],
    msgs: &[Fe],
    t: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Fe>, CodingError> {
    let n = xvals.len();
    let d = t + msgs.len() - 1;
    if 2 * d >= n {
        return Err(CodingError::BlockTooLarge {
            msgs: msgs.len(),
            t,
            n,
        });
    }
    let mut coeffs = msgs.to_vec();
    coeffs.extend((msgs.len()..=d).map(|_| ctx.random(rng)));
    Ok(poly::eval_many(ctx, &coeffs, xvals))
}

/// Result of a successful Reed–Solomon decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsDecoded {
    /// The `ell` recovered secrets (low coefficients of the codeword
    /// polynomial).
    pub secrets: Vec<Fe>,
    /// The x-values at which the received word disagrees with the decoded
    /// codeword.
    pub error_positions: Vec<Fe>,
}

/// Gao's Berlekamp–Welch decoder. `g0 = prod (x - xvals[i])` is preprocessed
/// by the caller; `d` bounds the codeword degree and `ell` is the number of
/// packed secrets to extract. `None` is the failure channel; the function
/// never panics on bad input.
pub fn rs_decode(
    ctx: &FieldCtx,
    xvals: &[Fe],
    shares: &[Fe],
    g0: &[Fe],
    d: usize,
    ell: usize,
) -> Option<RsDecoded> {
    if shares.len() != xvals.len() {
        return None;
    }
    let n = xvals.len();
    let below_target = |f: &[Fe]| 2 * poly::deg(f) < (n + d + 1) as isize;

    // All-zero codewords short-circuit: the zero polynomial interpolates
    // every subset, so treat the nonzero positions as errors if few enough.
    let max_errors = (n - d) / 2;
    let nonzero: Vec<Fe> = xvals
        .iter()
        .zip(shares.iter())
        .filter(|(_, s)| !s.is_zero())
        .map(|(x, _)| x.clone())
        .collect();
    if nonzero.len() <= max_errors {
        return Some(RsDecoded {
            secrets: vec![Fe::zero(); ell],
            error_positions: nonzero,
        });
    }

    let g1 = poly::interpolate(ctx, xvals, shares).ok()?;

    // Partial extended Euclid between g0 and g1 until the remainder degree
    // falls below (n + d + 1) / 2.
    let (g, v) = if below_target(&g1) {
        (g1, vec![Fe::one()])
    } else {
        let mut a = g0.to_vec();
        let mut b = g1;
        let mut t0: Vec<Fe> = Vec::new();
        let mut t1 = vec![Fe::one()];
        loop {
            let (q, r) = poly::div_rem(ctx, &a, &b).ok()?;
            let t2 = poly::sub(ctx, &t0, &poly::mul(ctx, &q, &t1));
            if below_target(&r) {
                break (r, t2);
            }
            a = b;
            b = r;
            t0 = t1;
            t1 = t2;
        }
    };

    let (q, r) = poly::div_rem(ctx, &g, &v).ok()?;
    if !poly::is_zero(&r) || poly::deg(&q) >= (d + 1) as isize {
        return None;
    }
    let secrets = (0..ell).map(|i| poly::coeff(&q, i)).collect();
    let error_positions = xvals
        .iter()
        .zip(shares.iter())
        .filter(|(x, s)| poly::eval(ctx, &q, x) != **s)
        .map(|(x, _)| x.clone())
        .collect();
    Some(RsDecoded {
        secrets,
        error_positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn setup(n: usize) -> (FieldCtx, Vec<Fe>, Vec<Fe>) {
        let ctx = FieldCtx::from_bit_length(32).unwrap();
        let xvals = gen_xvals(&ctx, n);
        let g0 = poly::build_from_roots(&ctx, &xvals);
        (ctx, xvals, g0)
    }

    #[test]
    fn share_and_decode_round_trip() {
        let mut rng = StdRng::seed_from_u64(41);
        for (n, t, ell) in [(4, 0, 1), (5, 1, 1), (9, 2, 2), (13, 3, 3)] {
            let (ctx, xvals, g0) = setup(n);
            let msgs: Vec<Fe> = (0..ell).map(|_| ctx.random(&mut rng)).collect();
            let shares = packed_share(&ctx, &xvals, &msgs, t, &mut rng).unwrap();
            let d = t + ell - 1;
            let decoded = rs_decode(&ctx, &xvals, &shares, &g0, d, ell).unwrap();
            assert_eq!(decoded.secrets, msgs);
            assert!(decoded.error_positions.is_empty());
        }
    }

    #[test]
    fn decoder_corrects_and_flags_errors() {
        let mut rng = StdRng::seed_from_u64(43);
        let (n, t) = (9, 2);
        let (ctx, xvals, g0) = setup(n);
        let msgs = vec![ctx.random(&mut rng)];
        let mut shares = packed_share(&ctx, &xvals, &msgs, t, &mut rng).unwrap();
        // d = t, so up to (n - d - 1) / 2 = 3 positions may be corrupted
        for i in [1, 4, 6] {
            shares[i] = ctx.add(&shares[i], &ctx.from_u64(5));
        }
        let decoded = rs_decode(&ctx, &xvals, &shares, &g0, t, 1).unwrap();
        assert_eq!(decoded.secrets, msgs);
        let mut flagged = decoded.error_positions.clone();
        flagged.sort();
        assert_eq!(
            flagged,
            vec![ctx.from_u64(2), ctx.from_u64(5), ctx.from_u64(7)]
        );
    }

    #[test]
    fn decoder_rejects_overwhelming_corruption() {
        let mut rng = StdRng::seed_from_u64(47);
        let (n, t) = (5, 1);
        let (ctx, xvals, g0) = setup(n);
        let msgs = vec![ctx.random(&mut rng)];
        let shares: Vec<Fe> = (0..n).map(|_| ctx.random(&mut rng)).collect();
        let _ = msgs;
        // a random word is almost surely not within distance (n - d) / 2 of
        // any degree-t codeword
        assert!(rs_decode(&ctx, &xvals, &shares, &g0, t, 1).is_none());
    }

    #[test]
    fn all_zero_shares_short_circuit() {
        let (ctx, xvals, g0) = setup(5);
        let shares = vec![Fe::zero(); 5];
        let decoded = rs_decode(&ctx, &xvals, &shares, &g0, 1, 1).unwrap();
        assert_eq!(decoded.secrets, vec![Fe::zero()]);
        assert!(decoded.error_positions.is_empty());
    }

    #[test]
    fn near_zero_shares_flag_the_outlier() {
        let (ctx, xvals, g0) = setup(5);
        let mut shares = vec![Fe::zero(); 5];
        shares[2] = ctx.from_u64(9);
        let decoded = rs_decode(&ctx, &xvals, &shares, &g0, 1, 1).unwrap();
        assert_eq!(decoded.secrets, vec![Fe::zero()]);
        assert_eq!(decoded.error_positions, vec![ctx.from_u64(3)]);
    }

    #[test]
    fn oversized_block_is_rejected() {
        let mut rng = StdRng::seed_from_u64(53);
        let (ctx, xvals, _) = setup(4);
        let msgs: Vec<Fe> = (0..2).map(|_| ctx.random(&mut rng)).collect();
        assert_eq!(
            packed_share(&ctx, &xvals, &msgs, 1, &mut rng).unwrap_err(),
            CodingError::BlockTooLarge { msgs: 2, t: 1, n: 4 }
        );
    }
}
