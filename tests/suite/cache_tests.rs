//! Temporary-cache behavior: transparency and flushing.

use pretty_assertions::assert_eq;

use tensorops::cache::cache_size;
use tensorops::{
    Environment, Tensor, compile_str, disable_cache, enable_cache, evaluate, flush_cache,
};

fn env_with_chain() -> Environment<f64> {
    let mut env = Environment::new();
    env.insert_tensor(
        "A",
        Tensor::from_fn(&[3, 4], |ix| (ix[0] * 4 + ix[1]) as f64),
    );
    env.insert_tensor(
        "B",
        Tensor::from_fn(&[4, 5], |ix| 1.0 - (ix[0] as f64) + 0.5 * (ix[1] as f64)),
    );
    env.insert_tensor(
        "C",
        Tensor::from_fn(&[5, 2], |ix| (ix[0] as f64) * (ix[1] as f64 + 1.0)),
    );
    env
}

#[test]
fn test_output_is_identical_with_and_without_cache() {
    let src = "D[a,d] := A[a,b] * B[b,c] * C[c,d]";

    enable_cache();
    let cached_program = compile_str(src).unwrap();
    let mut env = env_with_chain();
    // Run twice so the second evaluation reuses cached temporaries.
    evaluate(&cached_program, &mut env).unwrap();
    evaluate(&cached_program, &mut env).unwrap();
    let with_cache = env.tensor("D").unwrap().clone();

    disable_cache();
    let plain_program = compile_str(src).unwrap();
    let mut env = env_with_chain();
    evaluate(&plain_program, &mut env).unwrap();
    let without_cache = env.tensor("D").unwrap().clone();
    enable_cache();

    assert_eq!(with_cache, without_cache);
}

#[test]
fn test_cache_disabled_programs_never_reference_the_cache() {
    disable_cache();
    let program = compile_str("D[a,d] := A[a,b] * B[b,c] * C[c,d]").unwrap();
    enable_cache();
    let text = format!("{}", program);
    assert!(!text.contains("cached_similar_from_indices"));
}

#[test]
fn test_flush_empties_the_thread_partition() {
    enable_cache();
    flush_cache();
    let program = compile_str("D[a,d] := A[a,b] * B[b,c] * C[c,d]").unwrap();
    let mut env = env_with_chain();
    evaluate(&program, &mut env).unwrap();
    flush_cache();
    assert_eq!(cache_size(), 0);
}
