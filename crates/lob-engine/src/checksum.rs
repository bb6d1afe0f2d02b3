//! Book checksum verification for pointer-chained feeds.
//!
//! The venue computes a CRC over the top 25 levels of the merged book and
//! attaches it to every push. After applying an update that carries a
//! checksum, the engine recomputes it locally; a mismatch means the merged
//! book has diverged from the venue's and is treated like any other
//! corruption (forced resync).
//!
//! The checksum string interleaves bid and ask levels best-first as
//! `bid_px:bid_qty:ask_px:ask_qty:...`, skipping a side once it runs out
//! of depth, and the CRC is computed over the UTF-8 bytes.

use lob_core::OrderBook;

/// Levels per side covered by the checksum.
pub const CHECKSUM_DEPTH: usize = 25;

/// Compute the checksum of the merged book's top levels.
pub fn book_checksum(book: &OrderBook) -> u32 {
    let (bids, asks) = book.top_levels(CHECKSUM_DEPTH);

    let mut parts: Vec<String> = Vec::with_capacity(CHECKSUM_DEPTH * 4);
    for i in 0..CHECKSUM_DEPTH {
        if let Some(b) = bids.get(i) {
            parts.push(b.price.to_string());
            parts.push(b.qty.to_string());
        }
        if let Some(a) = asks.get(i) {
            parts.push(a.price.to_string());
            parts.push(a.qty.to_string());
        }
    }

    crc32c::crc32c(parts.join(":").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lob_core::{BookKey, ExchangeId, IncrementalUpdate, Price, PriceLevel, Size};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn level(px: Decimal, qty: Decimal) -> PriceLevel {
        PriceLevel::new(Price::new(px), Size::new(qty))
    }

    fn book_with(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> OrderBook {
        let mut book = OrderBook::new();
        book.apply(&IncrementalUpdate {
            key: BookKey::new(ExchangeId::Okx, "BTC-USDT"),
            first_update_id: 1,
            last_update_id: 1,
            bids,
            asks,
            timestamp: None,
            checksum: None,
        });
        book
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = book_with(
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            vec![level(dec!(101), dec!(1))],
        );
        let b = book_with(
            vec![level(dec!(99), dec!(2)), level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );
        // Insertion order is irrelevant, only book contents matter.
        assert_eq!(book_checksum(&a), book_checksum(&b));
    }

    #[test]
    fn test_checksum_changes_with_contents() {
        let a = book_with(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );
        let b = book_with(
            vec![level(dec!(100), dec!(2))],
            vec![level(dec!(101), dec!(1))],
        );
        assert_ne!(book_checksum(&a), book_checksum(&b));
    }

    #[test]
    fn test_checksum_known_string() {
        // "100:1:101:2" hashed directly must match the book computation.
        let book = book_with(
            vec![level(dec!(100), dec!(1))],
            vec![level(dec!(101), dec!(2))],
        );
        assert_eq!(book_checksum(&book), crc32c::crc32c(b"100:1:101:2"));
    }

    #[test]
    fn test_checksum_one_sided_book() {
        let book = book_with(vec![level(dec!(100), dec!(1))], vec![]);
        assert_eq!(book_checksum(&book), crc32c::crc32c(b"100:1"));
    }
}
