//! Dense univariate polynomials over a prime field. Coefficients run from
//! the constant term upwards; the zero polynomial is the empty vector and
//! vectors are kept trimmed of leading zeros.

use crate::field::{Fe, FieldCtx, FieldError};
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Schoolbook multiplication below this operand size, NTT above it.
const NTT_THRESHOLD: usize = 32;

/// Degree with the convention `deg(0) = -1`.
pub fn deg(f: &[Fe]) -> isize {
    f.len() as isize - 1
}

pub fn is_zero(f: &[Fe]) -> bool {
    f.is_empty()
}

/// Coefficient access past the stored length reads as zero.
pub fn coeff(f: &[Fe], i: usize) -> Fe {
    f.get(i).cloned().unwrap_or_default()
}

pub fn trim(f: &mut Vec<Fe>) {
    while f.last().is_some_and(|c| c.is_zero()) {
        f.pop();
    }
}

pub fn add(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Vec<Fe> {
    let mut out = vec![Fe::zero(); a.len().max(b.len())];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ctx.add(&coeff(a, i), &coeff(b, i));
    }
    trim(&mut out);
    out
}

pub fn sub(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Vec<Fe> {
    let mut out = vec![Fe::zero(); a.len().max(b.len())];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ctx.sub(&coeff(a, i), &coeff(b, i));
    }
    trim(&mut out);
    out
}

pub fn scale(ctx: &FieldCtx, f: &[Fe], c: &Fe) -> Vec<Fe> {
    let mut out: Vec<Fe> = f.iter().map(|x| ctx.mul(x, c)).collect();
    trim(&mut out);
    out
}

/// Horner evaluation.
pub fn eval(ctx: &FieldCtx, f: &[Fe], x: &Fe) -> Fe {
    let mut acc = Fe::zero();
    for c in f.iter().rev() {
        acc = ctx.add(&ctx.mul(&acc, x), c);
    }
    acc
}

pub fn eval_many(ctx: &FieldCtx, f: &[Fe], xs: &[Fe]) -> Vec<Fe> {
    xs.iter().map(|x| eval(ctx, f, x)).collect()
}

/// Formal derivative.
pub fn diff(ctx: &FieldCtx, f: &[Fe]) -> Vec<Fe> {
    if f.len() <= 1 {
        return Vec::new();
    }
    let mut out: Vec<Fe> = f
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, c)| ctx.mul(&ctx.from_u64(i as u64), c))
        .collect();
    trim(&mut out);
    out
}

fn schoolbook_mul(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Vec<Fe> {
    let mut acc = vec![BigUint::zero(); a.len() + b.len() - 1];
    for (i, ai) in a.iter().enumerate() {
        if ai.is_zero() {
            continue;
        }
        for (j, bj) in b.iter().enumerate() {
            acc[i + j] += ai * bj;
        }
    }
    let mut out: Vec<Fe> = acc.into_iter().map(|c| ctx.reduce(c)).collect();
    trim(&mut out);
    out
}

/// Primitive `2^log_m`-th root of unity, `zeta^(odd_factor * 2^(e - log_m))`.
fn root_of_unity(ctx: &FieldCtx, log_m: u32) -> Fe {
    let info = ctx.info();
    let exp = BigUint::from(info.odd_factor) << (info.two_exponent - log_m);
    ctx.pow(&ctx.from_u64(info.zeta as u64), &exp)
}

fn ntt(ctx: &FieldCtx, a: &mut [Fe], root: &Fe) {
    let n = a.len();
    let log_n = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - log_n);
        if i < j {
            a.swap(i, j);
        }
    }
    let mut len = 2;
    while len <= n {
        let stride = ctx.pow_u64(root, (n / len) as u64);
        for start in (0..n).step_by(len) {
            let mut w = Fe::one();
            for k in 0..len / 2 {
                let u = a[start + k].clone();
                let v = ctx.mul(&a[start + k + len / 2], &w);
                a[start + k] = ctx.add(&u, &v);
                a[start + k + len / 2] = ctx.sub(&u, &v);
                w = ctx.mul(&w, &stride);
            }
        }
        len <<= 1;
    }
}

fn ntt_mul(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Vec<Fe> {
    let need = a.len() + b.len() - 1;
    let m = need.next_power_of_two();
    let log_m = m.trailing_zeros();
    if log_m > ctx.info().two_exponent {
        return schoolbook_mul(ctx, a, b);
    }
    let root = root_of_unity(ctx, log_m);
    let mut fa = a.to_vec();
    let mut fb = b.to_vec();
    fa.resize(m, Fe::zero());
    fb.resize(m, Fe::zero());
    ntt(ctx, &mut fa, &root);
    ntt(ctx, &mut fb, &root);
    for (x, y) in fa.iter_mut().zip(fb.iter()) {
        *x = ctx.mul(x, y);
    }
    let root_inv = ctx
        .inv(&root)
        .expect("a root of unity is invertible");
    ntt(ctx, &mut fa, &root_inv);
    let m_inv = ctx
        .inv(&ctx.from_u64(m as u64))
        .expect("the transform size is below the field characteristic");
    let mut out: Vec<Fe> = fa
        .into_iter()
        .take(need)
        .map(|c| ctx.mul(&c, &m_inv))
        .collect();
    trim(&mut out);
    out
}

pub fn mul(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Vec<Fe> {
    if is_zero(a) || is_zero(b) {
        return Vec::new();
    }
    if a.len().min(b.len()) <= NTT_THRESHOLD {
        schoolbook_mul(ctx, a, b)
    } else {
        ntt_mul(ctx, a, b)
    }
}

pub fn sqr(ctx: &FieldCtx, a: &[Fe]) -> Vec<Fe> {
    mul(ctx, a, a)
}

/// Quotient and remainder of `a / b`.
pub fn div_rem(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Result<(Vec<Fe>, Vec<Fe>), FieldError> {
    if is_zero(b) {
        return Err(FieldError::ZeroDivisor);
    }
    let db = b.len() - 1;
    let mut r = a.to_vec();
    trim(&mut r);
    if r.len() < b.len() {
        return Ok((Vec::new(), r));
    }
    let lead_inv = ctx.inv(&b[db])?;
    let mut q = vec![Fe::zero(); r.len() - db];
    for i in (db..r.len()).rev() {
        if r[i].is_zero() {
            continue;
        }
        let c = ctx.mul(&r[i], &lead_inv);
        q[i - db] = c.clone();
        for (j, bj) in b.iter().enumerate() {
            r[i - db + j] = ctx.sub(&r[i - db + j], &ctx.mul(bj, &c));
        }
    }
    r.truncate(db);
    trim(&mut r);
    trim(&mut q);
    Ok((q, r))
}

/// Lagrange interpolation through `(x, y)` pairs.
pub fn interpolate(ctx: &FieldCtx, xs: &[Fe], ys: &[Fe]) -> Result<Vec<Fe>, FieldError> {
    if xs.len() != ys.len() {
        return Err(FieldError::MismatchedPoints);
    }
    let n = xs.len();
    let mut result: Vec<Fe> = Vec::new();
    for j in 0..n {
        let mut numerator = vec![Fe::one()];
        let mut denominator = Fe::one();
        for m in 0..n {
            if m != j {
                numerator = mul(ctx, &numerator, &[ctx.neg(&xs[m]), Fe::one()]);
                denominator = ctx.mul(&denominator, &ctx.sub(&xs[j], &xs[m]));
            }
        }
        let scalar = ctx.mul(
            &ys[j],
            &ctx.inv(&denominator).map_err(|_| FieldError::RepeatedPoint)?,
        );
        result = add(ctx, &result, &scale(ctx, &numerator, &scalar));
    }
    Ok(result)
}

/// Monic polynomial with the given roots, by divide and conquer.
pub fn build_from_roots(ctx: &FieldCtx, roots: &[Fe]) -> Vec<Fe> {
    match roots {
        [] => vec![Fe::one()],
        [r] => vec![ctx.neg(r), Fe::one()],
        _ => {
            let (lo, hi) = roots.split_at(roots.len() / 2);
            mul(
                ctx,
                &build_from_roots(ctx, lo),
                &build_from_roots(ctx, hi),
            )
        }
    }
}

pub fn make_monic(ctx: &FieldCtx, f: &[Fe]) -> Result<Vec<Fe>, FieldError> {
    let mut f = f.to_vec();
    trim(&mut f);
    if f.is_empty() {
        return Ok(f);
    }
    let lead_inv = ctx.inv(f.last().expect("trimmed nonzero polynomial"))?;
    Ok(scale(ctx, &f, &lead_inv))
}

/// Monic greatest common divisor.
pub fn gcd(ctx: &FieldCtx, a: &[Fe], b: &[Fe]) -> Result<Vec<Fe>, FieldError> {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    trim(&mut a);
    trim(&mut b);
    while !is_zero(&b) {
        let (_, r) = div_rem(ctx, &a, &b)?;
        a = b;
        b = r;
    }
    make_monic(ctx, &a)
}

/// `base^exp mod m` by square and multiply.
pub fn pow_mod(
    ctx: &FieldCtx,
    base: &[Fe],
    exp: &BigUint,
    m: &[Fe],
) -> Result<Vec<Fe>, FieldError> {
    let reduce = |f: &[Fe]| -> Result<Vec<Fe>, FieldError> {
        let (_, r) = div_rem(ctx, f, m)?;
        Ok(r)
    };
    let mut result = reduce(&[Fe::one()])?;
    let base = reduce(base)?;
    for i in (0..exp.bits()).rev() {
        result = reduce(&sqr(ctx, &result))?;
        if exp.bit(i) {
            result = reduce(&mul(ctx, &result, &base))?;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn ctx() -> FieldCtx {
        FieldCtx::from_bit_length(32).unwrap()
    }

    fn random_poly(ctx: &FieldCtx, len: usize, rng: &mut StdRng) -> Vec<Fe> {
        let mut f: Vec<Fe> = (0..len).map(|_| ctx.random(rng)).collect();
        trim(&mut f);
        f
    }

    #[test]
    fn derivative_of_quadratic() {
        let ctx = ctx();
        // 3 + 2x + x^2 -> 2 + 2x
        let f = vec![ctx.from_u64(3), ctx.from_u64(2), ctx.from_u64(1)];
        assert_eq!(diff(&ctx, &f), vec![ctx.from_u64(2), ctx.from_u64(2)]);
    }

    #[test]
    fn ntt_mul_matches_schoolbook() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(11);
        for len in [33, 40, 65, 100] {
            let a = random_poly(&ctx, len, &mut rng);
            let b = random_poly(&ctx, len + 3, &mut rng);
            assert_eq!(ntt_mul(&ctx, &a, &b), schoolbook_mul(&ctx, &a, &b));
        }
    }

    #[test]
    fn div_rem_reconstructs_dividend() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(13);
        let a = random_poly(&ctx, 17, &mut rng);
        let b = random_poly(&ctx, 5, &mut rng);
        let (q, r) = div_rem(&ctx, &a, &b).unwrap();
        let back = add(&ctx, &mul(&ctx, &q, &b), &r);
        assert_eq!(back, a);
        assert!(deg(&r) < deg(&b));
    }

    #[test]
    fn division_by_zero_polynomial_fails() {
        let ctx = ctx();
        let a = vec![ctx.from_u64(1)];
        assert_eq!(div_rem(&ctx, &a, &[]).unwrap_err(), FieldError::ZeroDivisor);
    }

    #[test]
    fn interpolation_recovers_polynomial() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(17);
        let f = random_poly(&ctx, 6, &mut rng);
        let xs: Vec<Fe> = (1..=6u64).map(|i| ctx.from_u64(i)).collect();
        let ys = eval_many(&ctx, &f, &xs);
        assert_eq!(interpolate(&ctx, &xs, &ys).unwrap(), f);
    }

    #[test]
    fn interpolation_rejects_repeated_points() {
        let ctx = ctx();
        let xs = vec![ctx.from_u64(1), ctx.from_u64(1)];
        let ys = vec![ctx.from_u64(2), ctx.from_u64(3)];
        assert_eq!(
            interpolate(&ctx, &xs, &ys).unwrap_err(),
            FieldError::RepeatedPoint
        );
    }

    #[test]
    fn build_from_roots_vanishes_on_roots() {
        let ctx = ctx();
        let roots: Vec<Fe> = (3..9u64).map(|i| ctx.from_u64(i)).collect();
        let f = build_from_roots(&ctx, &roots);
        assert_eq!(deg(&f), roots.len() as isize);
        for r in &roots {
            assert!(eval(&ctx, &f, r).is_zero());
        }
        assert!(!eval(&ctx, &f, &ctx.from_u64(1)).is_zero());
    }

    #[test]
    fn pow_mod_matches_naive() {
        let ctx = ctx();
        let mut rng = StdRng::seed_from_u64(19);
        let m = random_poly(&ctx, 5, &mut rng);
        let base = random_poly(&ctx, 4, &mut rng);
        let mut naive = vec![Fe::one()];
        for e in 0..12u32 {
            let fast = pow_mod(&ctx, &base, &BigUint::from(e), &m).unwrap();
            assert_eq!(fast, div_rem(&ctx, &naive, &m).unwrap().1);
            naive = mul(&ctx, &naive, &base);
        }
    }
}
