//! Root finding over FFT-friendly prime fields. The main path is the
//! tangent-Graeffe transform: shift the polynomial by a random tau, apply
//! the Graeffe update until the roots become powers of a primitive root of
//! unity, then batch-evaluate on that subgroup and read the roots off the
//! tangent component. Degrees too large for the subgroup structure (or
//! primes with a tiny two-adic part) fall back to classical equal-degree
//! splitting.

use crate::field::{Fe, FieldCtx};
use crate::poly;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use rand::Rng;
use tracing::debug;

/// Converts power sums `p_1 .. p_degree` of an unknown multiset into the
/// monic polynomial vanishing on it, via Newton's identity
/// `k e_k = sum_{i=1..k} (-1)^(i-1) e_{k-i} p_i`.
pub fn newton_to_polynomial(ctx: &FieldCtx, power_sums: &[Fe], degree: usize) -> Vec<Fe> {
    assert!(power_sums.len() >= degree);
    let mut out = vec![Fe::zero(); degree + 1];
    out[degree] = Fe::one();
    if degree == 0 {
        return out;
    }
    out[degree - 1] = ctx.neg(&power_sums[0]);
    for i in (0..degree.saturating_sub(1)).rev() {
        let mut acc = power_sums[degree - 1 - i].clone();
        for j in 0..degree - 1 - i {
            acc = ctx.add(&acc, &ctx.mul(&power_sums[j], &out[i + j + 1]));
        }
        let k_inv = ctx
            .inv(&ctx.from_u64((degree - i) as u64))
            .expect("the degree stays below the field characteristic");
        out[i] = ctx.mul(&ctx.neg(&acc), &k_inv);
    }
    out
}

/// Order-`deg(f)` Taylor expansion of `f` around `neg_tau` as the pair
/// `(h, hbar)` with `h[i] = f^(i)(neg_tau) / i!` and `hbar` the same shifted
/// down by one.
fn initial_linear_expansion(ctx: &FieldCtx, f: &[Fe], neg_tau: &Fe) -> (Vec<Fe>, Vec<Fe>) {
    let d = f.len() - 1;
    let mut h = vec![Fe::zero(); d + 1];
    let mut hbar = vec![Fe::zero(); d];
    h[0] = poly::eval(ctx, f, neg_tau);
    let mut factorial = Fe::one();
    let mut derived = poly::diff(ctx, f);
    for i in 1..=d {
        let taylor = poly::eval(ctx, &derived, neg_tau);
        let fact_inv = ctx
            .inv(&factorial)
            .expect("factorials below the characteristic are nonzero");
        hbar[i - 1] = ctx.mul(&taylor, &fact_inv);
        factorial = ctx.mul(&factorial, &ctx.from_u64(i as u64));
        let fact_inv = ctx
            .inv(&factorial)
            .expect("factorials below the characteristic are nonzero");
        h[i] = ctx.mul(&taylor, &fact_inv);
        derived = poly::diff(ctx, &derived);
    }
    (h, hbar)
}

/// One Graeffe step: `h <- even part of h_e^2 - x h_o^2`, `hbar <- even part
/// of 2 h hbar(-x)`, squaring the roots while tracking the tangent.
fn update_linear_expansion(ctx: &FieldCtx, h: &mut [Fe], hbar: &mut [Fe]) {
    let hbarneg: Vec<Fe> = hbar
        .iter()
        .enumerate()
        .map(|(i, c)| if i % 2 == 0 { c.clone() } else { ctx.neg(c) })
        .collect();

    let mut a_even = vec![Fe::zero(); h.len()];
    let mut a_odd = vec![Fe::zero(); h.len()];
    for (i, c) in h.iter().enumerate() {
        if i % 2 == 0 {
            a_even[i] = c.clone();
        } else {
            a_odd[i] = c.clone();
        }
    }
    let a = poly::sub(ctx, &poly::sqr(ctx, &a_even), &poly::sqr(ctx, &a_odd));
    let b = poly::mul(ctx, h, &hbarneg);

    let two = ctx.from_u64(2);
    for (i, c) in h.iter_mut().enumerate() {
        *c = poly::coeff(&a, 2 * i);
    }
    for (i, c) in hbar.iter_mut().enumerate() {
        *c = ctx.mul(&two, &poly::coeff(&b, 2 * i));
    }
}

fn tangent_graeffe(ctx: &FieldCtx, f: &[Fe], steps: u32, tau: &Fe) -> (Vec<Fe>, Vec<Fe>) {
    let neg_tau = ctx.neg(tau);
    let (mut h, mut hbar) = initial_linear_expansion(ctx, f, &neg_tau);
    for _ in 0..steps {
        update_linear_expansion(ctx, &mut h, &mut hbar);
    }
    (h, hbar)
}

/// Evaluates `f` at the `chi`-th roots of unity `z^i = w^(2i)` via the
/// Bluestein chirp product with the precomputed tables of `w^(i^2)` and
/// their inverses.
fn batch_eval(ctx: &FieldCtx, f: &[Fe], pw: &[Fe], pwi: &[Fe]) -> Vec<Fe> {
    let chi = pw.len();
    let mut tmp = vec![Fe::zero(); chi];
    for (i, slot) in tmp.iter_mut().enumerate() {
        *slot = ctx.mul(&poly::coeff(f, i), &pw[i]);
    }
    let prod = poly::mul(ctx, &tmp, pwi);
    (0..chi)
        .map(|i| {
            let folded = ctx.add(&poly::coeff(&prod, i), &poly::coeff(&prod, i + chi));
            ctx.mul(&folded, &pw[i])
        })
        .collect()
}

/// Roots of `f` in the base field, with multiplicity, by classical
/// distinct-root extraction: `gcd(f, x^p - x)` isolates the product of the
/// distinct linear factors, random quadratic-residue splits separate them,
/// and repeated division recovers multiplicities.
pub fn direct_roots(ctx: &FieldCtx, f: &[Fe], rng: &mut impl Rng) -> Vec<Fe> {
    let mut roots = Vec::new();
    let mut f = match poly::make_monic(ctx, f) {
        Ok(g) => g,
        Err(_) => return roots,
    };
    while f.len() > 1 && f[0].is_zero() {
        roots.push(Fe::zero());
        f.remove(0);
    }
    if f.len() <= 1 {
        return roots;
    }
    let x = vec![Fe::zero(), Fe::one()];
    let xp = match poly::pow_mod(ctx, &x, ctx.prime(), &f) {
        Ok(p) => p,
        Err(_) => return roots,
    };
    let splitting = match poly::gcd(ctx, &f, &poly::sub(ctx, &xp, &x)) {
        Ok(g) => g,
        Err(_) => return roots,
    };
    let mut distinct = Vec::new();
    split_linear(ctx, &splitting, rng, &mut distinct);
    for r in distinct {
        let lin = vec![ctx.neg(&r), Fe::one()];
        while let Ok((q, rem)) = poly::div_rem(ctx, &f, &lin) {
            if !poly::is_zero(&rem) {
                break;
            }
            roots.push(r.clone());
            f = q;
        }
    }
    roots
}

/// Equal-degree splitting of a monic product of distinct linear factors.
fn split_linear(ctx: &FieldCtx, g: &[Fe], rng: &mut impl Rng, out: &mut Vec<Fe>) {
    if poly::deg(g) <= 0 {
        return;
    }
    if poly::deg(g) == 1 {
        out.push(ctx.neg(&g[0]));
        return;
    }
    let half = (ctx.prime() - 1u32) >> 1u32;
    loop {
        let shift = vec![ctx.random(rng), Fe::one()];
        let t = match poly::pow_mod(ctx, &shift, &half, g) {
            Ok(t) => t,
            Err(_) => return,
        };
        let t = poly::sub(ctx, &t, &[Fe::one()]);
        let s = match poly::gcd(ctx, g, &t) {
            Ok(s) => s,
            Err(_) => return,
        };
        if poly::deg(&s) > 0 && poly::deg(&s) < poly::deg(g) {
            let (q, _) = match poly::div_rem(ctx, g, &s) {
                Ok(qr) => qr,
                Err(_) => return,
            };
            split_linear(ctx, &s, rng, out);
            split_linear(ctx, &q, rng, out);
            return;
        }
    }
}

/// Finds the multiset of roots of `f` in the base field. Under-recovery is
/// reported by returning fewer than `deg(f)` roots; the function itself
/// never fails.
pub fn find_roots(ctx: &FieldCtx, f: &[Fe], rng: &mut impl Rng) -> Vec<Fe> {
    let degree = poly::deg(f);
    if degree <= 0 {
        return Vec::new();
    }
    let info = ctx.info();
    let e = info.two_exponent;
    if e <= 3 {
        return direct_roots(ctx, f, rng);
    }
    let mut ell: u32 = 1;
    let mut chi_bound = BigUint::from(info.odd_factor) << (e - 2 - ell);
    let degree_zz = BigUint::from(degree as u64);
    if degree_zz >= chi_bound {
        return direct_roots(ctx, f, rng);
    }
    while degree_zz < chi_bound && ell < e - 2 {
        chi_bound >>= 1u32;
        ell += 1;
    }

    // p = chi * rho + 1 with rho = 2^ell and chi = 4 * odd * 2^(e - 2 - ell);
    // the loop bounds chi by roughly eight times the degree, so it fits.
    let chi = (chi_bound << 2u32)
        .to_usize()
        .expect("the subgroup order is bounded by the polynomial degree");
    let zeta = ctx.from_u64(info.zeta as u64);
    let rho = BigUint::one() << ell;
    let rho_fe = ctx.pow_u64(&ctx.from_u64(2), ell as u64);
    // z is a primitive chi-th root of unity, w its square root
    let z = ctx.pow(&zeta, &rho);
    let w = ctx.pow(&zeta, &(&rho >> 1u32));

    let tau = ctx.random(rng);
    let (h, hbar) = tangent_graeffe(ctx, f, ell, &tau);
    let hprime = poly::diff(ctx, &h);

    let mut pw = vec![Fe::zero(); chi];
    let mut pwi = vec![Fe::zero(); chi];
    pw[0] = Fe::one();
    pwi[0] = Fe::one();
    {
        let w_squared = ctx.mul(&w, &w);
        let mut w_diff_square = w.clone();
        let mut w_power_i_squared = w.clone();
        for i in 1..chi {
            pw[i] = w_power_i_squared.clone();
            pwi[i] = ctx
                .inv(&w_power_i_squared)
                .expect("powers of a root of unity are nonzero");
            w_diff_square = ctx.mul(&w_diff_square, &w_squared);
            w_power_i_squared = ctx.mul(&w_power_i_squared, &w_diff_square);
        }
    }

    let h_eval = batch_eval(ctx, &h, &pw, &pwi);
    let hbar_eval = batch_eval(ctx, &hbar, &pw, &pwi);
    let hprime_eval = batch_eval(ctx, &hprime, &pw, &pwi);

    let mut found = Vec::new();
    let mut y = Fe::one();
    for i in 0..chi {
        // y = z^i; if h(y) = 0 but the tangent component is not, the chain
        // rule inverts the Graeffe iterations back to a root of f
        if h_eval[i].is_zero() && !hbar_eval[i].is_zero() {
            let slope = ctx
                .inv(&hbar_eval[i])
                .expect("checked nonzero");
            let num = ctx.mul(&ctx.mul(&rho_fe, &y), &hprime_eval[i]);
            found.push(ctx.sub(&ctx.mul(&num, &slope), &tau));
        }
        y = ctx.mul(&y, &z);
    }
    if poly::eval(ctx, f, &tau).is_zero() {
        found.push(tau.clone());
    }

    if (found.len() as isize) < degree {
        if found.is_empty() {
            // repeated roots have a vanishing tangent and stay invisible to
            // the transform; hand the whole remainder to direct splitting
            debug!(degree, "tangent transform made no progress, splitting directly");
            return direct_roots(ctx, f, rng);
        }
        let product = poly::build_from_roots(ctx, &found);
        if let Ok((cofactor, rem)) = poly::div_rem(ctx, f, &product) {
            if poly::is_zero(&rem) {
                found.extend(find_roots(ctx, &cofactor, rng));
            }
        }
    }
    found
}
