use anyhow::{Context, Result, bail};
use std::collections::HashSet;

/// Number of rollouts evaluated when no seeds are requested.
pub const DEFAULT_TRIALS: u64 = 200;

/// Resolve CLI seed tokens into an ordered, duplicate-free seed list.
///
/// Supports literal integers (negative values fold to their magnitude) and
/// half-open ranges written `start..end`. An empty token list expands to
/// `0..DEFAULT_TRIALS`.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut pending: Vec<u64> = Vec::new();

    for token in tokens {
        if token.is_empty() {
            continue;
        }

        if let Some((start, end)) = token.split_once("..") {
            let start = parse_bound(start, token)?;
            let end = parse_bound(end, token)?;
            if end < start {
                bail!("Seed range {token} is reversed");
            }
            pending.extend(start..end);
            continue;
        }

        if let Ok(value) = token.parse::<i64>() {
            pending.push(value.unsigned_abs());
            continue;
        }

        if let Ok(value) = token.parse::<u64>() {
            pending.push(value);
            continue;
        }

        bail!("Unrecognized seed token: {token}");
    }

    let mut seen = HashSet::new();
    pending.retain(|seed| seen.insert(*seed));

    if pending.is_empty() {
        pending.extend(0..DEFAULT_TRIALS);
    }

    Ok(pending)
}

fn parse_bound(raw: &str, token: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("invalid seed range bound in {token}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn resolves_numeric_and_negative() {
        let seeds = resolve_seed_inputs(&tokens(&["42", "-7", "18446744073709551615"])).unwrap();
        assert_eq!(seeds, vec![42, 7, u64::MAX]);
    }

    #[test]
    fn expands_ranges_and_dedupes() {
        let seeds = resolve_seed_inputs(&tokens(&["3..6", "4", "0..2"])).unwrap();
        assert_eq!(seeds, vec![3, 4, 5, 0, 1]);
    }

    #[test]
    fn empty_input_uses_default_rollouts() {
        let seeds = resolve_seed_inputs(&[]).unwrap();
        assert_eq!(seeds.len() as u64, DEFAULT_TRIALS);
        assert_eq!(seeds.first(), Some(&0));
        assert_eq!(seeds.last(), Some(&(DEFAULT_TRIALS - 1)));
    }

    #[test]
    fn rejects_garbage_and_reversed_ranges() {
        assert!(resolve_seed_inputs(&tokens(&["abc"])).is_err());
        assert!(resolve_seed_inputs(&tokens(&["9..2"])).is_err());
        assert!(resolve_seed_inputs(&tokens(&["1..x"])).is_err());
    }
}
