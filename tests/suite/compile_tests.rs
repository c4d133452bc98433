//! End-to-end compilation scenarios: source text through the compiler and
//! interpreter against reference results.

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;

use tensorops::{Environment, Tensor, compile_str, evaluate, evaluate_str};

fn matmul(a: &Tensor<f64>, b: &Tensor<f64>) -> Tensor<f64> {
    let (m, k, n) = (a.size(0), a.size(1), b.size(1));
    Tensor::from_fn(&[m, n], |ix| {
        (0..k).map(|j| a.get(&[ix[0], j]) * b.get(&[j, ix[1]])).sum()
    })
}

fn chain_env() -> Environment<f64> {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1] + 1) as f64),
    );
    env.insert_tensor(
        "B",
        Tensor::from_fn(&[3, 4], |ix| 0.5 * (ix[0] as f64) - (ix[1] as f64)),
    );
    env.insert_tensor(
        "C",
        Tensor::from_fn(&[4, 2], |ix| (ix[0] as f64) + 2.0 * (ix[1] as f64)),
    );
    env
}

#[test]
fn test_chain_compiles_to_left_fold_and_matches_product() {
    let mut env = chain_env();
    let program = compile_str("D[a,d] := A[a,b] * B[b,c] * C[c,d]").unwrap();

    // Two sequential pairwise contractions.
    let text = format!("{}", program);
    assert_eq!(text.matches("tensorops.contract").count(), 2);

    let result = evaluate(&program, &mut env).unwrap().unwrap();
    let d = result.as_tensor().unwrap().clone();

    let ab = matmul(env.tensor("A").unwrap(), env.tensor("B").unwrap());
    let abc = matmul(&ab, env.tensor("C").unwrap());
    for a in 0..2 {
        for dd in 0..2 {
            assert_abs_diff_eq!(d.get(&[a, dd]), abc.get(&[a, dd]), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_internal_trace_compiles_to_trace_kernel() {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[2, 3, 3], |ix| (ix[0] * 9 + ix[1] * 3 + ix[2]) as f64),
    );
    let program = compile_str("E[a] := A[a,b,b]").unwrap();
    assert!(format!("{}", program).contains("tensorops.trace"));

    let result = evaluate(&program, &mut env).unwrap().unwrap();
    let e = result.as_tensor().unwrap().clone();
    let a = env.tensor("A").unwrap();
    for i in 0..2 {
        let expected: f64 = (0..3).map(|b| a.get(&[i, b, b])).sum();
        assert_eq!(e.get(&[i]), expected);
    }
}

#[test]
fn test_trace_factor_inside_contraction() {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[2, 3, 3], |ix| (ix[0] + ix[1] * 2 + ix[2]) as f64),
    );
    env.insert_tensor(
        "G",
        Tensor::from_fn(&[2, 4], |ix| (1 + ix[0] + 5 * ix[1]) as f64),
    );
    let program = compile_str("F[c] := A[a,b,b] * G[a,c]").unwrap();
    let text = format!("{}", program);
    assert!(text.contains("tensorops.trace"));
    assert!(text.contains("tensorops.contract"));

    let result = evaluate(&program, &mut env).unwrap().unwrap();
    let f = result.as_tensor().unwrap().clone();
    let a = env.tensor("A").unwrap();
    let g = env.tensor("G").unwrap();
    for c in 0..4 {
        let expected: f64 = (0..2)
            .map(|i| (0..3).map(|b| a.get(&[i, b, b])).sum::<f64>() * g.get(&[i, c]))
            .sum();
        assert_abs_diff_eq!(f.get(&[c]), expected, epsilon = 1e-12);
    }
}

#[test]
fn test_assignment_accumulates_and_defines() {
    let mut env = Environment::new();
    env.insert_tensor("u", Tensor::from_fn(&[3], |ix| (ix[0] + 1) as f64));
    env.insert_tensor("v", Tensor::from_fn(&[3], |ix| (2 * ix[0]) as f64));

    evaluate_str("w[i] := 2 * u[i] + v[i]", &mut env).unwrap();
    let w = env.tensor("w").unwrap();
    for i in 0..3 {
        assert_eq!(w.get(&[i]), 2.0 * (i + 1) as f64 + (2 * i) as f64);
    }

    evaluate_str("w[i] -= u[i]", &mut env).unwrap();
    let w = env.tensor("w").unwrap();
    for i in 0..3 {
        assert_eq!(w.get(&[i]), (i + 1) as f64 + (2 * i) as f64);
    }
}

#[test]
fn test_scalar_extraction_from_full_contraction() {
    let mut env = Environment::new();
    env.insert_tensor("u", Tensor::from_fn(&[4], |ix| (ix[0] + 1) as f64));
    let result = evaluate_str("norm2 = u[i] * u[i]", &mut env).unwrap();
    assert_eq!(result.unwrap().as_scalar().unwrap(), 1.0 + 4.0 + 9.0 + 16.0);
}

#[test]
fn test_left_right_rows_concatenate() {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[2, 3], |ix| (10 * ix[0] + ix[1]) as f64),
    );
    // The same permutation written with and without a right row.
    evaluate_str("P[j;i] := A[i,j]", &mut env).unwrap();
    evaluate_str("Q[j,i] := A[i,j]", &mut env).unwrap();
    assert_eq!(env.tensor("P").unwrap(), env.tensor("Q").unwrap());
}

#[test]
fn test_primed_indices_are_distinct_labels() {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[2, 2], |ix| (2 * ix[0] + ix[1]) as f64),
    );
    // i and i' are independent: this is a transpose, not a trace.
    evaluate_str("T[i',i] := A[i,i']", &mut env).unwrap();
    let t = env.tensor("T").unwrap();
    let a = env.tensor("A").unwrap();
    for x in 0..2 {
        for y in 0..2 {
            assert_eq!(t.get(&[x, y]), a.get(&[y, x]));
        }
    }
}

#[test]
fn test_positional_integer_convention() {
    let mut env = chain_env();
    // NCON form of the matrix product: contracted label 1, free -1/-2.
    let result = evaluate_str("D[-1,-2] := A[-1,1] * B[1,-2]", &mut env).unwrap();
    let d = result.unwrap().as_tensor().unwrap().clone();
    let reference = matmul(env.tensor("A").unwrap(), env.tensor("B").unwrap());
    assert_eq!(d, reference);
}

#[test]
fn test_positional_convention_completes_empty_lhs() {
    let mut env = chain_env();
    let result = evaluate_str("D[] := A[-1,1] * B[1,-2]", &mut env).unwrap();
    let d = result.unwrap().as_tensor().unwrap().clone();
    let reference = matmul(env.tensor("A").unwrap(), env.tensor("B").unwrap());
    assert_eq!(d, reference);
}

#[test]
fn test_scalar_division_and_negation() {
    let mut env = Environment::new();
    env.insert_tensor("u", Tensor::from_fn(&[2], |ix| (ix[0] + 1) as f64));
    evaluate_str("w[i] := -u[i] / 2", &mut env).unwrap();
    let w = env.tensor("w").unwrap();
    assert_eq!(w.get(&[0]), -0.5);
    assert_eq!(w.get(&[1]), -1.0);
}

#[test]
fn test_conj_distributes_through_real_contraction() {
    let mut env = chain_env();
    evaluate_str("D[a,c] := conj(A[a,b] * B[b,c])", &mut env).unwrap();
    evaluate_str("E[a,c] := A[a,b] * B[b,c]", &mut env).unwrap();
    assert_eq!(env.tensor("D").unwrap(), env.tensor("E").unwrap());
}

#[test]
fn test_defective_statement_fails_only_at_run_time() {
    // The second statement is defective; compilation still succeeds and
    // running the program raises only on reaching the emitted construct.
    let program =
        compile_str("D[a,c] := A[a,b] * B[b,c]\nX[q] := A[a,b] * B[a,b,q,q]").unwrap();
    assert!(format!("{}", program).contains("tensorops.index_error"));
    let mut env = chain_env();
    assert!(evaluate(&program, &mut env).is_err());
}

#[test]
fn test_repeated_output_index_is_rejected() {
    let mut env = chain_env();
    assert!(evaluate_str("D[a,a] := A[a,b] * B[b,a]", &mut env).is_err());
}

#[test]
fn test_triple_index_is_rejected() {
    let mut env = chain_env();
    env.insert_tensor("M", Tensor::from_fn(&[3, 3], |_| 1.0));
    assert!(evaluate_str("D[a,c] := A[a,b] * B[b,c] * M[b,b]", &mut env).is_err());
}
