use crate::domain::manifest::{SEGMENT_SEPARATOR, WILDCARD};

/// Wildcard-aware descriptor comparison.
///
/// A filter of exactly `*` matches any descriptor. Otherwise both sides are
/// split into dot segments, the segment counts must agree, and a `*` segment
/// in the filter matches any single published segment.
pub fn descriptor_matches(filter: &str, published: &str) -> bool {
    if filter == WILDCARD {
        return true;
    }
    let mut wanted = filter.split(SEGMENT_SEPARATOR);
    let mut actual = published.split(SEGMENT_SEPARATOR);
    loop {
        match (wanted.next(), actual.next()) {
            (None, None) => return true,
            (Some(w), Some(a)) if w == WILDCARD || w == a => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*", "Order", true)]
    #[case("*", "Order.Invoice", true)]
    #[case("Order", "Order", true)]
    #[case("Order", "Orders", false)]
    #[case("Order.*", "Order.Invoice", true)]
    #[case("Order.*", "Order", false)]
    #[case("*.Invoice", "Order.Invoice", true)]
    #[case("Order.*.Draft", "Order.Invoice.Draft", true)]
    #[case("Order.*.Draft", "Order.Invoice.Final", false)]
    #[case("Order.Invoice", "Order.Invoice.Draft", false)]
    fn descriptor_cases(#[case] filter: &str, #[case] published: &str, #[case] expected: bool) {
        assert_eq!(descriptor_matches(filter, published), expected);
    }
}
