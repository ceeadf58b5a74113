use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive, Zero};

/// 按 360 天/年计息
pub const DAYS_IN_YEAR: i64 = 360;
/// 1 = 10_000 bps
pub const BPS_PER_UNIT: i64 = 10_000;
/// 中间结果保留的小数位数
const INTERMEDIATE_SCALE: i64 = 10;

/// 实际期间利率: round_half_up(annual * days / 360)
pub fn effective_rate(annual_rate_in_bps: i64, financing_days: i64) -> i64 {
    divide_half_up(
        BigDecimal::from(annual_rate_in_bps) * BigDecimal::from(financing_days),
        DAYS_IN_YEAR,
    )
}

/// 贴现金额 (分): round_half_up(value * rate / 10_000)
pub fn discount_amount(value_in_cents: i64, rate_in_bps: i64) -> i64 {
    divide_half_up(
        BigDecimal::from(value_in_cents) * BigDecimal::from(rate_in_bps),
        BPS_PER_UNIT,
    )
}

/// 先四舍五入到 10 位小数，再四舍五入到整数
fn divide_half_up(numerator: BigDecimal, denominator: i64) -> i64 {
    let quotient = (numerator / BigDecimal::from(denominator))
        .with_scale_round(INTERMEDIATE_SCALE, RoundingMode::HalfUp)
        .with_scale_round(0, RoundingMode::HalfUp);

    quotient.to_i64().unwrap_or(if quotient < BigDecimal::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_rate_uses_360_day_year() {
        assert_eq!(effective_rate(360, 360), 360);
        assert_eq!(effective_rate(360, 30), 30);
        assert_eq!(effective_rate(0, 90), 0);
    }

    #[test]
    fn effective_rate_rounds_half_up() {
        // 50 * 30 / 360 = 4.1666..
        assert_eq!(effective_rate(50, 30), 4);
        // 40 * 30 / 360 = 3.333..
        assert_eq!(effective_rate(40, 30), 3);
        // 60 * 3 / 360 = 0.5
        assert_eq!(effective_rate(60, 3), 1);
        // 100 * 9 / 360 = 2.5
        assert_eq!(effective_rate(100, 9), 3);
        // 30 * 20 / 360 = 1.666..
        assert_eq!(effective_rate(30, 20), 2);
    }

    #[test]
    fn effective_rate_for_past_maturity_is_negative() {
        assert_eq!(effective_rate(360, -10), -10);
        assert_eq!(effective_rate(60, -3), -1);
    }

    #[test]
    fn discount_amount_rounds_to_whole_cents() {
        assert_eq!(discount_amount(1_000_000, 3), 300);
        // 12_345 * 7 / 10_000 = 8.6415
        assert_eq!(discount_amount(12_345, 7), 9);
        // 5_000 * 1 / 10_000 = 0.5
        assert_eq!(discount_amount(5_000, 1), 1);
        // 4_999 * 1 / 10_000 = 0.4999
        assert_eq!(discount_amount(4_999, 1), 0);
    }

    #[test]
    fn discount_amount_handles_large_values_without_overflow() {
        let value = i64::MAX / 2;
        assert_eq!(discount_amount(value, 0), 0);
        assert_eq!(discount_amount(value, BPS_PER_UNIT), value);
    }
}
