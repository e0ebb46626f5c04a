//! UID-set compaction (spec.md §4.G, §8, E2E scenario 4), grounded in
//! `spruce-imap-utils.c`'s `uidset_add`/`spruce_imap_get_uid_set`.
//!
//! Builds the textual UID sets (`a,b:c,d:e`) used by batched `UID FETCH`,
//! `UID STORE`, `UID COPY`/`MOVE`, and `UID EXPUNGE` commands, fitting each
//! batch within a caller-supplied byte budget (the remaining space on the
//! wire command line after its fixed template text).

/// Builds one UID-set batch starting at `uids[start..]`, stopping once
/// adding the next UID would make the rendered string `budget` bytes or
/// longer. Returns `(rendered, consumed)`; `consumed` is how many entries
/// of `uids` (starting at `start`) went into `rendered`. Call again with
/// `start + consumed` to get the next batch.
///
/// `uids` must be sorted ascending (the server's own sequence/UID order);
/// this is not re-validated here.
#[must_use]
pub fn compact(uids: &[u32], start: usize, budget: usize) -> (String, usize) {
    if start >= uids.len() {
        return (String::new(), 0);
    }

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let mut setlen: usize = 0;
    let mut consumed = 0usize;

    for &uid in &uids[start..] {
        match ranges.last().copied() {
            None => {
                let len = decimal_len(uid);
                if len >= budget {
                    break;
                }
                ranges.push((uid, uid));
                setlen = len;
                consumed += 1;
            }
            Some((first, last)) if uid == last + 1 => {
                let old_len = range_len(first, last);
                let new_len = range_len(first, uid);
                let delta = new_len - old_len;
                if setlen + delta >= budget {
                    break;
                }
                ranges.last_mut().unwrap().1 = uid;
                setlen += delta;
                consumed += 1;
            }
            Some(_) => {
                let added = 1 + decimal_len(uid); // ',' + uid
                if setlen + added >= budget {
                    break;
                }
                ranges.push((uid, uid));
                setlen += added;
                consumed += 1;
            }
        }
    }

    let rendered = ranges
        .iter()
        .map(|&(first, last)| {
            if first == last {
                first.to_string()
            } else {
                format!("{first}:{last}")
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    (rendered, consumed)
}

fn decimal_len(mut n: u32) -> usize {
    if n == 0 {
        return 1;
    }
    let mut len = 0;
    while n > 0 {
        len += 1;
        n /= 10;
    }
    len
}

fn range_len(first: u32, last: u32) -> usize {
    if first == last {
        decimal_len(first)
    } else {
        decimal_len(first) + 1 + decimal_len(last)
    }
}

/// Parses a rendered set (`a,b:c,d:e`) back into the ordered list of UIDs
/// it denotes. Used by tests to check the round-trip law in spec.md §8.
#[must_use]
pub fn parse(set: &str) -> Vec<u32> {
    let mut out = Vec::new();
    if set.is_empty() {
        return out;
    }
    for part in set.split(',') {
        if let Some((a, b)) = part.split_once(':') {
            let (a, b): (u32, u32) = (a.parse().unwrap_or(0), b.parse().unwrap_or(0));
            out.extend(a..=b);
        } else if let Ok(n) = part.parse::<u32>() {
            out.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tight_budget_batches_as_in_spec_scenario() {
        let uids = [1, 2, 3, 5, 6, 7, 10];
        let (rendered, consumed) = compact(&uids, 0, 10);
        assert_eq!(rendered, "1:3,5:7");
        assert_eq!(consumed, 6);

        let (rendered2, consumed2) = compact(&uids, consumed, 10);
        assert_eq!(rendered2, "10");
        assert_eq!(consumed2, 1);
    }

    #[test]
    fn single_uid_fits_trivially() {
        let uids = [42];
        let (rendered, consumed) = compact(&uids, 0, 10);
        assert_eq!(rendered, "42");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn budget_too_small_for_even_one_uid_consumes_nothing() {
        let uids = [123456];
        let (rendered, consumed) = compact(&uids, 0, 3);
        assert_eq!(rendered, "");
        assert_eq!(consumed, 0);
    }

    proptest! {
        #[test]
        fn round_trip_preserves_order_and_respects_budget(
            mut uids in prop::collection::vec(1u32..500, 1..40),
            budget in 4usize..64,
        ) {
            uids.sort_unstable();
            uids.dedup();
            let mut start = 0;
            let mut out = Vec::new();
            let mut guard = 0;
            while start < uids.len() {
                let (rendered, consumed) = compact(&uids, start, budget);
                prop_assert!(rendered.len() < budget || consumed == 0);
                prop_assert!(consumed > 0, "must make forward progress when budget allows a single UID");
                out.extend(parse(&rendered));
                start += consumed;
                guard += 1;
                prop_assert!(guard < 1000);
            }
            prop_assert_eq!(out, uids);
        }
    }
}
