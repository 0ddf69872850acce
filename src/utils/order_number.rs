use chrono::Utc;
use rand::Rng;

/// 生成人类可读的订单号: `PH` + UTC时间戳 + 4位随机数字
///
/// 时间戳加随机后缀在高并发下不是绝对唯一的; 真正的保证来自
/// `orders.order_number` 上的唯一索引, 冲突时调用方用新号码重试。
pub fn generate_order_number() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "PH{}{:04}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rng.gen_range(0..10000)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        let number = generate_order_number();
        assert!(number.starts_with("PH"));
        assert_eq!(number.len(), 20); // "PH" + 14位时间戳 + 4位随机数
        assert!(number[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_sequential_numbers_usually_differ() {
        // 同一秒内也有1/10000的随机后缀, 重复概率极小
        let a = generate_order_number();
        let b = generate_order_number();
        let c = generate_order_number();
        assert!(a != b || b != c);
    }
}
