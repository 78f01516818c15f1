//! Number → string conversion, ECMA-262 §9.8.1.

use crate::consts::NUMBER_MAX_PRINT_SIZE;

use super::{errol0_dtoa, number_to_uint32, uint32_to_digits};

/// Write the canonical decimal form of `num` into `buf` and return the
/// byte count. `buf` must hold at least
/// [`NUMBER_MAX_PRINT_SIZE`](crate::consts::NUMBER_MAX_PRINT_SIZE) bytes.
pub fn print_number(num: f64, buf: &mut [u8]) -> usize {
    debug_assert!(buf.len() >= NUMBER_MAX_PRINT_SIZE);

    if num.is_nan() {
        buf[..3].copy_from_slice(b"NaN");
        return 3;
    }
    if num == 0.0 {
        buf[0] = b'0';
        return 1;
    }
    if num < 0.0 {
        buf[0] = b'-';
        return 1 + print_positive(-num, &mut buf[1..]);
    }
    print_positive(num, buf)
}

fn print_positive(num: f64, buf: &mut [u8]) -> usize {
    if num == f64::INFINITY {
        buf[..8].copy_from_slice(b"Infinity");
        return 8;
    }

    // Values that survive a uint32 round trip print as plain integers.
    let as_uint32 = number_to_uint32(num);
    if f64::from(as_uint32) == num {
        return uint32_to_digits(as_uint32, buf);
    }

    let mut digits = [0u8; 64];
    let (k, n) = errol0_dtoa(num, &mut digits);
    let k = k as i32;
    let digits = &digits[..k as usize];

    // §9.8.1 steps 6-10; num = 0.d₁…dₖ × 10ⁿ.
    let mut len = 0usize;
    let mut push = |buf: &mut [u8], b: u8| {
        buf[len] = b;
        len += 1;
    };

    if k <= n && n <= 21 {
        // 6. digits followed by n-k zeros
        for &d in digits {
            push(buf, d);
        }
        for _ in 0..(n - k) {
            push(buf, b'0');
        }
    } else if 0 < n && n <= 21 {
        // 7. decimal point inside the digit run
        for &d in &digits[..n as usize] {
            push(buf, d);
        }
        push(buf, b'.');
        for &d in &digits[n as usize..] {
            push(buf, d);
        }
    } else if -6 < n && n <= 0 {
        // 8. 0.00…digits
        push(buf, b'0');
        push(buf, b'.');
        for _ in 0..(-n) {
            push(buf, b'0');
        }
        for &d in digits {
            push(buf, d);
        }
    } else {
        // 9-10. exponent form
        push(buf, digits[0]);
        if k > 1 {
            push(buf, b'.');
            for &d in &digits[1..] {
                push(buf, d);
            }
        }
        push(buf, b'e');
        let exponent = n - 1;
        push(buf, if exponent < 0 { b'-' } else { b'+' });
        let mut exp_digits = [0u8; 10];
        let exp_len = uint32_to_digits(exponent.unsigned_abs(), &mut exp_digits);
        for &d in &exp_digits[..exp_len] {
            push(buf, d);
        }
    }

    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::parse_number;

    fn printed(num: f64) -> String {
        let mut buf = [0u8; NUMBER_MAX_PRINT_SIZE];
        let len = print_number(num, &mut buf);
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }

    #[test]
    fn specials() {
        assert_eq!(printed(f64::NAN), "NaN");
        assert_eq!(printed(0.0), "0");
        assert_eq!(printed(-0.0), "0");
        assert_eq!(printed(f64::INFINITY), "Infinity");
        assert_eq!(printed(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn integers_print_plainly() {
        assert_eq!(printed(1.0), "1");
        assert_eq!(printed(42.0), "42");
        assert_eq!(printed(4294967295.0), "4294967295");
        assert_eq!(printed(-7.0), "-7");
    }

    #[test]
    fn fixed_decimal_forms() {
        assert_eq!(printed(3.14), "3.14");
        assert_eq!(printed(0.1), "0.1");
        assert_eq!(printed(0.001025), "0.001025");
        assert_eq!(printed(123.456), "123.456");
        assert_eq!(printed(-0.5), "-0.5");
    }

    #[test]
    fn large_and_small_use_exponent_form() {
        assert_eq!(printed(1e21), "1e+21");
        assert_eq!(printed(1e-7), "1e-7");
        assert_eq!(printed(1.5e22), "1.5e+22");
        assert_eq!(printed(123456789012345680000.0), "123456789012345680000");
        assert_eq!(printed(5e-324), "5e-324");
        assert_eq!(printed(1.7976931348623157e308), "1.7976931348623157e+308");
    }

    #[test]
    fn parse_print_agrees_on_scenarios() {
        // "3.14e2" parses to a float that prints in integer form.
        let x = parse_number(b"3.14e2");
        assert_eq!(x, 314.0);
        assert_eq!(printed(x), "314");
    }

    #[test]
    fn round_trips_sample_values() {
        for &x in &[
            0.3,
            1.0 / 3.0,
            6.02214076e23,
            2.2250738585072014e-308,
            9007199254740991.0,
            0.000030517578125,
        ] {
            let s = printed(x);
            assert_eq!(parse_number(s.as_bytes()), x, "{s}");
        }
    }
}
