// Parser fuzz-style robustness tests
// Goal: ensure reading, error formatting and evaluation never panic on
// malformed or hostile input.

use sexpflow::{parse_all, EvaluationLimits, EvaluatorConfig, ReaderConfig, Runtime};

fn xorshift64(mut x: u64) -> u64 {
    // Simple deterministic PRNG (no external deps)
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

fn gen_case(seed: u64, max_len: usize) -> String {
    let tokens: [&str; 36] = [
        "(", ")", "(", ")", " ", "\n", "\t", "\"", "'", ";", "\\", "let", "if", "lambda", "bind",
        "loop", "quote", "set!", "list", "get-field", "attempt", "nil", "#t", "#f", "0", "1", "-2",
        "3.5", "1e", "+", "-", "*", "/", "x", "\\u{", "é",
    ];

    let mut out = String::new();
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15u64;
    let target_len = (state as usize % max_len).max(1);

    while out.len() < target_len {
        state = xorshift64(state);
        let tok = tokens[(state as usize) % tokens.len()];
        out.push_str(tok);
    }
    out
}

#[test]
fn test_parser_never_panics_on_generated_inputs() {
    // Keep it small enough to stay fast in CI, but large enough to catch regressions.
    const CASES: u64 = 400;
    const MAX_LEN: usize = 256;

    for seed in 0..CASES {
        let input = gen_case(seed, MAX_LEN);

        let parse_result = std::panic::catch_unwind(|| parse_all(&input));
        assert!(
            parse_result.is_ok(),
            "parse_all panicked for seed {} input {:?}",
            seed,
            input
        );

        if let Ok(Err(err)) = parse_result {
            let formatted = std::panic::catch_unwind(|| err.format_with_context(&input));
            assert!(
                formatted.is_ok(),
                "format_with_context panicked for seed {} input {:?}",
                seed,
                input
            );
            let formatted = formatted.unwrap();
            assert!(
                formatted.starts_with("error: "),
                "formatted error should start with a header; got:\n{}",
                formatted
            );
            assert!(err.position.offset <= input.len());
        }
    }
}

#[test]
fn test_evaluation_never_panics_on_generated_inputs() {
    const CASES: u64 = 300;
    const MAX_LEN: usize = 128;

    for seed in 0..CASES {
        let input = gen_case(seed.wrapping_mul(7919), MAX_LEN);
        let outcome = std::panic::catch_unwind(|| {
            let config = EvaluatorConfig {
                reader: ReaderConfig::default(),
                limits: EvaluationLimits {
                    max_call_depth: 64,
                    max_steps: 10_000,
                    max_eval_depth: 1_000,
                },
            };
            let mut runtime = Runtime::with_config(config);
            // Errors are expected; only panics are failures
            let _ = runtime.eval_source(&input);
        });
        assert!(
            outcome.is_ok(),
            "evaluation panicked for seed {} input {:?}",
            seed,
            input
        );
    }
}
