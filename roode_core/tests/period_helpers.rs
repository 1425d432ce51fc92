// Focused tests for period helpers.
use roode_core::util::period_ms;

#[test]
fn period_ms_minimum_and_resolution() {
    assert_eq!(period_ms(1), 1000);
    assert_eq!(period_ms(50), 20);
    // hz>=1000 floors to 0ms but we cap to >=1ms
    assert_eq!(period_ms(1000), 1);
    assert_eq!(period_ms(u32::MAX), 1);
}

#[test]
fn period_ms_treats_zero_as_one_hz() {
    assert_eq!(period_ms(0), 1000);
}
