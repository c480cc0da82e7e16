//! Unit tests for reported-count conventions.

use chardev::LengthConvention;

#[test]
fn terminator_convention_drops_the_newline() {
    assert_eq!(LengthConvention::Terminator.reported_count(b"hello\n"), 5);
}

#[test]
fn terminator_convention_undercounts_unterminated_text() {
    assert_eq!(LengthConvention::Terminator.reported_count(b"hello"), 4);
}

#[test]
fn terminator_convention_saturates_on_empty_content() {
    assert_eq!(LengthConvention::Terminator.reported_count(b""), 0);
    assert_eq!(LengthConvention::Terminator.reported_count(b"\0\0\0"), 0);
}

#[test]
fn count_stops_at_first_zero_byte() {
    assert_eq!(LengthConvention::Terminator.reported_count(b"ab\n\0cd\n"), 2);
    assert_eq!(LengthConvention::Exact.reported_count(b"ab\0cd\n"), 2);
}

#[test]
fn exact_convention_counts_text_without_newline() {
    assert_eq!(LengthConvention::Exact.reported_count(b"hello\n"), 5);
    assert_eq!(LengthConvention::Exact.reported_count(b"hello"), 5);
    assert_eq!(LengthConvention::Exact.reported_count(b"\n"), 0);
}

#[test]
fn default_convention_is_terminator() {
    assert_eq!(LengthConvention::default(), LengthConvention::Terminator);
}
