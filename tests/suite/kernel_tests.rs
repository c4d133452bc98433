//! Kernel-level scenarios: permutation, trace, contraction, and the
//! GEMM/native dispatch.

use approx::assert_abs_diff_eq;
use num_complex::Complex64;
use pretty_assertions::assert_eq;

use tensorops::{Conj, Tensor, add, contract, disable_blas, enable_blas, trace};

/// Naive einsum for a pairwise contraction, used as the reference result.
fn naive_contract(
    a: &Tensor<f64>,
    b: &Tensor<f64>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    indc: &[usize],
) -> Tensor<f64> {
    let mut oab: Vec<usize> = oinda.iter().map(|&i| a.size(i)).collect();
    oab.extend(oindb.iter().map(|&i| b.size(i)));
    let c_shape: Vec<usize> = indc.iter().map(|&j| oab[j]).collect();
    let contracted: Vec<usize> = cinda.iter().map(|&i| a.size(i)).collect();

    Tensor::from_fn(&c_shape, |cix| {
        let mut open = vec![0usize; oab.len()];
        for (i, &j) in indc.iter().enumerate() {
            open[j] = cix[i];
        }
        let mut total = 0.0;
        let mut kix = vec![0usize; contracted.len()];
        loop {
            let mut aix = vec![0usize; a.rank()];
            for (pos, &axis) in oinda.iter().enumerate() {
                aix[axis] = open[pos];
            }
            for (pos, &axis) in cinda.iter().enumerate() {
                aix[axis] = kix[pos];
            }
            let mut bix = vec![0usize; b.rank()];
            for (pos, &axis) in oindb.iter().enumerate() {
                bix[axis] = open[oinda.len() + pos];
            }
            for (pos, &axis) in cindb.iter().enumerate() {
                bix[axis] = kix[pos];
            }
            total += a.get(&aix) * b.get(&bix);

            let mut axis = 0;
            loop {
                if axis == contracted.len() {
                    return total;
                }
                kix[axis] += 1;
                if kix[axis] < contracted[axis] {
                    break;
                }
                kix[axis] = 0;
                axis += 1;
            }
            if contracted.is_empty() {
                return total;
            }
        }
    })
}

#[test]
fn test_add_permutes_into_destination() {
    // C[i,j,k] = A[k,i,j].
    let a = Tensor::from_fn(&[2, 3, 4], |ix| (100 * ix[0] + 10 * ix[1] + ix[2]) as f64);
    let mut c = Tensor::zeros(&[3, 4, 2]);
    add(1.0, &a, Conj::Plain, 0.0, &mut c, &[1, 2, 0], &[]).unwrap();
    for i in 0..3 {
        for j in 0..4 {
            for k in 0..2 {
                assert_eq!(c.get(&[i, j, k]), a.get(&[k, i, j]));
            }
        }
    }
}

#[test]
fn test_permutation_round_trip() {
    let a = Tensor::from_fn(&[2, 3, 4], |ix| (ix[0] * 31 + ix[1] * 7 + ix[2]) as f64);
    let perm = [2usize, 0, 1];
    let inverse = [1usize, 2, 0];

    let mut forward = Tensor::zeros(&[4, 2, 3]);
    add(1.0, &a, Conj::Plain, 0.0, &mut forward, &perm, &[]).unwrap();
    let mut back = Tensor::zeros(&[2, 3, 4]);
    add(1.0, &forward, Conj::Plain, 0.0, &mut back, &inverse, &[]).unwrap();

    assert_eq!(back, a);
}

#[test]
fn test_trace_pairs_the_marked_axes() {
    // C[j] = A[0,j,0] + A[1,j,1].
    let a = Tensor::from_fn(&[2, 3, 2], |ix| (9 * ix[0] + 3 * ix[1] + ix[2]) as f64);
    let mut c = Tensor::zeros(&[3]);
    trace(1.0, &a, Conj::Plain, 0.0, &mut c, &[1], &[], &[0], &[2]).unwrap();
    for j in 0..3 {
        assert_eq!(c.get(&[j]), a.get(&[0, j, 0]) + a.get(&[1, j, 1]));
    }
}

#[test]
fn test_trace_pairing_order_is_irrelevant() {
    let a = Tensor::from_fn(&[2, 2, 3, 3], |ix| {
        (ix[0] * 2 + ix[1] * 5 + ix[2] * 11 + ix[3] * 17) as f64
    });

    let mut both = Tensor::zeros(&[]);
    trace(1.0, &a, Conj::Plain, 0.0, &mut both, &[], &[], &[0, 2], &[1, 3]).unwrap();

    // First pair then second, and the other way around.
    let mut t1 = Tensor::zeros(&[3, 3]);
    trace(1.0, &a, Conj::Plain, 0.0, &mut t1, &[2, 3], &[], &[0], &[1]).unwrap();
    let mut r1 = Tensor::zeros(&[]);
    trace(1.0, &t1, Conj::Plain, 0.0, &mut r1, &[], &[], &[0], &[1]).unwrap();

    let mut t2 = Tensor::zeros(&[2, 2]);
    trace(1.0, &a, Conj::Plain, 0.0, &mut t2, &[0, 1], &[], &[2], &[3]).unwrap();
    let mut r2 = Tensor::zeros(&[]);
    trace(1.0, &t2, Conj::Plain, 0.0, &mut r2, &[], &[], &[0], &[1]).unwrap();

    assert_eq!(both.get(&[]), r1.get(&[]));
    assert_eq!(both.get(&[]), r2.get(&[]));
}

#[test]
fn test_contract_matches_matrix_product() {
    // C[i,l] = sum_j A[i,j] * B[j,l].
    let a = Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1] + 1) as f64);
    let b = Tensor::from_fn(&[3, 4], |ix| (ix[0] * 4 + ix[1] + 1) as f64);
    let mut c = Tensor::zeros(&[2, 4]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();

    for i in 0..2 {
        for l in 0..4 {
            let expected: f64 = (0..3).map(|j| a.get(&[i, j]) * b.get(&[j, l])).sum();
            assert_eq!(c.get(&[i, l]), expected);
        }
    }
}

#[test]
fn test_contract_integer_elements_match_float_result() {
    // The same values through the native integer path and the float path.
    let ai = Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1]) as i64);
    let bi = Tensor::from_fn(&[3, 4], |ix| (ix[0] * 4 + ix[1]) as i64);
    let mut ci = Tensor::zeros(&[2, 4]);
    contract(
        1, &ai, Conj::Plain, &bi, Conj::Plain, 0, &mut ci,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();

    let af = Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1]) as f64);
    let bf = Tensor::from_fn(&[3, 4], |ix| (ix[0] * 4 + ix[1]) as f64);
    let mut cf = Tensor::zeros(&[2, 4]);
    contract(
        1.0, &af, Conj::Plain, &bf, Conj::Plain, 0.0, &mut cf,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();

    for i in 0..2 {
        for l in 0..4 {
            assert_eq!(ci.get(&[i, l]) as f64, cf.get(&[i, l]));
        }
    }
}

#[test]
fn test_contract_equals_naive_einsum() {
    // C[c,a,d] from A[a,b,c] and B[d,b]: contract b, permute the output.
    let a = Tensor::from_fn(&[2, 3, 4], |ix| {
        (ix[0] as f64) + 0.5 * (ix[1] as f64) - 1.25 * (ix[2] as f64)
    });
    let b = Tensor::from_fn(&[5, 3], |ix| (ix[0] as f64) * 0.75 - (ix[1] as f64));
    let oinda = [0usize, 2];
    let cinda = [1usize];
    let oindb = [0usize];
    let cindb = [1usize];
    let indc = [1usize, 0, 2];

    let mut c = Tensor::zeros(&[4, 2, 5]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
        &oinda, &cinda, &oindb, &cindb, &indc, None,
    )
    .unwrap();

    let reference = naive_contract(&a, &b, &oinda, &cinda, &oindb, &cindb, &indc);
    for x in 0..4 {
        for y in 0..2 {
            for z in 0..5 {
                assert_abs_diff_eq!(
                    c.get(&[x, y, z]),
                    reference.get(&[x, y, z]),
                    epsilon = 1e-12
                );
            }
        }
    }
}

#[test]
fn test_blas_and_native_paths_agree() {
    let a = Tensor::from_fn(&[3, 4, 2], |ix| {
        0.25 * (ix[0] as f64) - (ix[1] as f64) + 2.0 * (ix[2] as f64)
    });
    let b = Tensor::from_fn(&[4, 3, 5], |ix| {
        (ix[0] as f64) * 1.5 + (ix[1] as f64) - 0.125 * (ix[2] as f64)
    });
    // Contract the first two axes of A against (1,0) of B, permuted output.
    let args: (&[usize], &[usize], &[usize], &[usize], &[usize]) =
        (&[2], &[0, 1], &[2], &[1, 0], &[1, 0]);

    enable_blas();
    let mut with_blas = Tensor::zeros(&[5, 2]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut with_blas,
        args.0, args.1, args.2, args.3, args.4, None,
    )
    .unwrap();

    disable_blas();
    let mut without = Tensor::zeros(&[5, 2]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut without,
        args.0, args.1, args.2, args.3, args.4, None,
    )
    .unwrap();
    enable_blas();

    for x in 0..5 {
        for y in 0..2 {
            assert_abs_diff_eq!(
                with_blas.get(&[x, y]),
                without.get(&[x, y]),
                epsilon = 1e-10
            );
        }
    }
}

#[test]
fn test_role_swap_orientations_agree() {
    // A transposed destination makes the swapped ordering cheaper; the
    // result must not depend on the orientation chosen.
    let a = Tensor::from_fn(&[6, 3], |ix| (ix[0] * 3 + ix[1]) as f64);
    let b = Tensor::from_fn(&[3, 7], |ix| (ix[0] * 7 + ix[1]) as f64);

    let mut forward = Tensor::zeros(&[6, 7]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut forward,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();

    // Same contraction with the output axes permuted: C'[l,i] = C[i,l].
    let mut permuted = Tensor::zeros(&[7, 6]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut permuted,
        &[0], &[1], &[1], &[0], &[1, 0], None,
    )
    .unwrap();

    for i in 0..6 {
        for l in 0..7 {
            assert_eq!(forward.get(&[i, l]), permuted.get(&[l, i]));
        }
    }
}

#[test]
fn test_conj_and_adjoint_agree_on_reals() {
    let a = Tensor::from_fn(&[3, 3], |ix| (ix[0] * 3 + ix[1]) as f64);
    let mut with_conj = Tensor::zeros(&[3, 3]);
    let mut with_adjoint = Tensor::zeros(&[3, 3]);
    add(2.0, &a, Conj::Conjugate, 0.0, &mut with_conj, &[1, 0], &[]).unwrap();
    add(2.0, &a, Conj::Adjoint, 0.0, &mut with_adjoint, &[1, 0], &[]).unwrap();
    assert_eq!(with_conj, with_adjoint);
}

#[test]
fn test_complex_conjugated_contraction() {
    // C[i,k] = sum_j conj(A[i,j]) * B[j,k] against a hand-rolled loop.
    let a = Tensor::from_fn(&[2, 3], |ix| Complex64::new(ix[0] as f64, ix[1] as f64 + 1.0));
    let b = Tensor::from_fn(&[3, 2], |ix| Complex64::new(1.0 - ix[0] as f64, ix[1] as f64));
    let one = Complex64::new(1.0, 0.0);
    let zero = Complex64::new(0.0, 0.0);

    let mut c = Tensor::zeros(&[2, 2]);
    contract(
        one, &a, Conj::Conjugate, &b, Conj::Plain, zero, &mut c,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();

    for i in 0..2 {
        for k in 0..2 {
            let expected: Complex64 = (0..3)
                .map(|j| a.get(&[i, j]).conj() * b.get(&[j, k]))
                .sum();
            assert_abs_diff_eq!(c.get(&[i, k]).re, expected.re, epsilon = 1e-12);
            assert_abs_diff_eq!(c.get(&[i, k]).im, expected.im, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_zero_size_axis_produces_zero_tensor() {
    let a = Tensor::<f64>::zeros(&[3, 0]);
    let b = Tensor::<f64>::zeros(&[0, 2]);
    let mut c = Tensor::from_fn(&[3, 2], |_| f64::NAN);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
        &[0], &[1], &[1], &[0], &[0, 1], None,
    )
    .unwrap();
    assert_eq!(c, Tensor::zeros(&[3, 2]));
}

#[test]
fn test_scalar_destination_from_full_contraction() {
    let a = Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1]) as f64);
    let b = Tensor::from_fn(&[2, 3], |ix| 1.0 + (ix[0] + ix[1]) as f64);
    let mut c = Tensor::zeros(&[]);
    contract(
        1.0, &a, Conj::Plain, &b, Conj::Plain, 0.0, &mut c,
        &[], &[0, 1], &[], &[0, 1], &[], None,
    )
    .unwrap();
    let expected: f64 = (0..2)
        .flat_map(|i| (0..3).map(move |j| (i, j)))
        .map(|(i, j)| a.get(&[i, j]) * b.get(&[i, j]))
        .sum();
    assert_eq!(c.get(&[]), expected);
}
