//! The standard Huffman tables B.1 to B.15 (Annex B.5).
//!
//! Each table is built on first use and then shared by the whole process.

use std::sync::OnceLock;

use super::{Code, HuffmanTable};
use crate::error::{HuffmanError, Result};

/// Return standard table B.`n`, for `n` in `1..=15`.
pub fn standard_table(n: u8) -> Result<&'static HuffmanTable> {
    static TABLES: [OnceLock<Result<HuffmanTable>>; 15] = [const { OnceLock::new() }; 15];

    let idx = usize::from(n)
        .checked_sub(1)
        .filter(|&i| i < LINES.len())
        .ok_or(HuffmanError::UnknownStandardTable(n))?;

    TABLES[idx]
        .get_or_init(|| HuffmanTable::build(LINES[idx]))
        .as_ref()
        .map_err(|e| *e)
}

static LINES: [&[Code]; 15] = [
    TABLE_A, TABLE_B, TABLE_C, TABLE_D, TABLE_E, TABLE_F, TABLE_G, TABLE_H, TABLE_I, TABLE_J,
    TABLE_K, TABLE_L, TABLE_M, TABLE_N, TABLE_O,
];

/// Table B.1 - Standard Huffman table A (HTOOB = 0)
#[rustfmt::skip]
const TABLE_A: &[Code] = &[
    Code::value(1, 4, 0), // 0...15
    Code::value(2, 8, 16), // 16...271
    Code::value(3, 16, 272), // 272...65807
    Code::upper(3, 65808), // 65808...∞
];

/// Table B.2 - Standard Huffman table B (HTOOB = 1)
#[rustfmt::skip]
const TABLE_B: &[Code] = &[
    Code::value(1, 0, 0), // 0
    Code::value(2, 0, 1), // 1
    Code::value(3, 0, 2), // 2
    Code::value(4, 3, 3), // 3...10
    Code::value(5, 6, 11), // 11...74
    Code::upper(6, 75), // 75...∞
    Code::oob(6), // OOB
];

/// Table B.3 - Standard Huffman table C (HTOOB = 1)
#[rustfmt::skip]
const TABLE_C: &[Code] = &[
    Code::value(8, 8, -256), // -256...-1
    Code::value(1, 0, 0), // 0
    Code::value(2, 0, 1), // 1
    Code::value(3, 0, 2), // 2
    Code::value(4, 3, 3), // 3...10
    Code::value(5, 6, 11), // 11...74
    Code::lower(8, -257), // -∞...-257
    Code::upper(7, 75), // 75...∞
    Code::oob(6), // OOB
];

/// Table B.4 - Standard Huffman table D (HTOOB = 0)
#[rustfmt::skip]
const TABLE_D: &[Code] = &[
    Code::value(1, 0, 1), // 1
    Code::value(2, 0, 2), // 2
    Code::value(3, 0, 3), // 3
    Code::value(4, 3, 4), // 4...11
    Code::value(5, 6, 12), // 12...75
    Code::upper(5, 76), // 76...∞
];

/// Table B.5 - Standard Huffman table E (HTOOB = 0)
#[rustfmt::skip]
const TABLE_E: &[Code] = &[
    Code::value(7, 8, -255), // -255...0
    Code::value(1, 0, 1), // 1
    Code::value(2, 0, 2), // 2
    Code::value(3, 0, 3), // 3
    Code::value(4, 3, 4), // 4...11
    Code::value(5, 6, 12), // 12...75
    Code::lower(7, -256), // -∞...-256
    Code::upper(6, 76), // 76...∞
];

/// Table B.6 - Standard Huffman table F (HTOOB = 0)
#[rustfmt::skip]
const TABLE_F: &[Code] = &[
    Code::value(5, 10, -2048), // -2048...-1025
    Code::value(4, 9, -1024), // -1024...-513
    Code::value(4, 8, -512), // -512...-257
    Code::value(4, 7, -256), // -256...-129
    Code::value(5, 6, -128), // -128...-65
    Code::value(5, 5, -64), // -64...-33
    Code::value(4, 5, -32), // -32...-1
    Code::value(2, 7, 0), // 0...127
    Code::value(3, 7, 128), // 128...255
    Code::value(3, 8, 256), // 256...511
    Code::value(4, 9, 512), // 512...1023
    Code::value(4, 10, 1024), // 1024...2047
    Code::lower(6, -2049), // -∞...-2049
    Code::upper(6, 2048), // 2048...∞
];

/// Table B.7 - Standard Huffman table G (HTOOB = 0)
#[rustfmt::skip]
const TABLE_G: &[Code] = &[
    Code::value(4, 9, -1024), // -1024...-513
    Code::value(3, 8, -512), // -512...-257
    Code::value(4, 7, -256), // -256...-129
    Code::value(5, 6, -128), // -128...-65
    Code::value(5, 5, -64), // -64...-33
    Code::value(4, 5, -32), // -32...-1
    Code::value(4, 5, 0), // 0...31
    Code::value(5, 5, 32), // 32...63
    Code::value(5, 6, 64), // 64...127
    Code::value(4, 7, 128), // 128...255
    Code::value(3, 8, 256), // 256...511
    Code::value(3, 9, 512), // 512...1023
    Code::value(3, 10, 1024), // 1024...2047
    Code::lower(5, -1025), // -∞...-1025
    Code::upper(5, 2048), // 2048...∞
];

/// Table B.8 - Standard Huffman table H (HTOOB = 1)
#[rustfmt::skip]
const TABLE_H: &[Code] = &[
    Code::value(8, 3, -15), // -15...-8
    Code::value(9, 1, -7), // -7...-6
    Code::value(8, 1, -5), // -5...-4
    Code::value(9, 0, -3), // -3
    Code::value(7, 0, -2), // -2
    Code::value(4, 0, -1), // -1
    Code::value(2, 1, 0), // 0...1
    Code::value(5, 0, 2), // 2
    Code::value(6, 0, 3), // 3
    Code::value(3, 4, 4), // 4...19
    Code::value(6, 1, 20), // 20...21
    Code::value(4, 4, 22), // 22...37
    Code::value(4, 5, 38), // 38...69
    Code::value(5, 6, 70), // 70...133
    Code::value(5, 7, 134), // 134...261
    Code::value(6, 7, 262), // 262...389
    Code::value(7, 8, 390), // 390...645
    Code::value(6, 10, 646), // 646...1669
    Code::lower(9, -16), // -∞...-16
    Code::upper(9, 1670), // 1670...∞
    Code::oob(2), // OOB
];

/// Table B.9 - Standard Huffman table I (HTOOB = 1)
#[rustfmt::skip]
const TABLE_I: &[Code] = &[
    Code::value(8, 4, -31), // -31...-16
    Code::value(9, 2, -15), // -15...-12
    Code::value(8, 2, -11), // -11...-8
    Code::value(9, 1, -7), // -7...-6
    Code::value(7, 1, -5), // -5...-4
    Code::value(4, 1, -3), // -3...-2
    Code::value(3, 1, -1), // -1...0
    Code::value(3, 1, 1), // 1...2
    Code::value(5, 1, 3), // 3...4
    Code::value(6, 1, 5), // 5...6
    Code::value(3, 5, 7), // 7...38
    Code::value(6, 2, 39), // 39...42
    Code::value(4, 5, 43), // 43...74
    Code::value(4, 6, 75), // 75...138
    Code::value(5, 7, 139), // 139...266
    Code::value(5, 8, 267), // 267...522
    Code::value(6, 8, 523), // 523...778
    Code::value(7, 9, 779), // 779...1290
    Code::value(6, 11, 1291), // 1291...3338
    Code::lower(9, -32), // -∞...-32
    Code::upper(9, 3339), // 3339...∞
    Code::oob(2), // OOB
];

/// Table B.10 - Standard Huffman table J (HTOOB = 1)
#[rustfmt::skip]
const TABLE_J: &[Code] = &[
    Code::value(7, 4, -21), // -21...-6
    Code::value(8, 0, -5), // -5
    Code::value(7, 0, -4), // -4
    Code::value(5, 0, -3), // -3
    Code::value(2, 2, -2), // -2...1
    Code::value(5, 0, 2), // 2
    Code::value(6, 0, 3), // 3
    Code::value(7, 0, 4), // 4
    Code::value(8, 0, 5), // 5
    Code::value(2, 6, 6), // 6...69
    Code::value(5, 5, 70), // 70...101
    Code::value(6, 5, 102), // 102...133
    Code::value(6, 6, 134), // 134...197
    Code::value(6, 7, 198), // 198...325
    Code::value(6, 8, 326), // 326...581
    Code::value(6, 9, 582), // 582...1093
    Code::value(6, 10, 1094), // 1094...2117
    Code::value(7, 11, 2118), // 2118...4165
    Code::lower(8, -22), // -∞...-22
    Code::upper(8, 4166), // 4166...∞
    Code::oob(2), // OOB
];

/// Table B.11 - Standard Huffman table K (HTOOB = 0)
#[rustfmt::skip]
const TABLE_K: &[Code] = &[
    Code::value(1, 0, 1), // 1
    Code::value(2, 1, 2), // 2...3
    Code::value(4, 0, 4), // 4
    Code::value(4, 1, 5), // 5...6
    Code::value(5, 1, 7), // 7...8
    Code::value(5, 2, 9), // 9...12
    Code::value(6, 2, 13), // 13...16
    Code::value(7, 2, 17), // 17...20
    Code::value(7, 3, 21), // 21...28
    Code::value(7, 4, 29), // 29...44
    Code::value(7, 5, 45), // 45...76
    Code::value(7, 6, 77), // 77...140
    Code::upper(7, 141), // 141...∞
];

/// Table B.12 - Standard Huffman table L (HTOOB = 0)
#[rustfmt::skip]
const TABLE_L: &[Code] = &[
    Code::value(1, 0, 1), // 1
    Code::value(2, 0, 2), // 2
    Code::value(3, 1, 3), // 3...4
    Code::value(5, 0, 5), // 5
    Code::value(5, 1, 6), // 6...7
    Code::value(6, 1, 8), // 8...9
    Code::value(7, 0, 10), // 10
    Code::value(7, 1, 11), // 11...12
    Code::value(7, 2, 13), // 13...16
    Code::value(7, 3, 17), // 17...24
    Code::value(7, 4, 25), // 25...40
    Code::value(8, 5, 41), // 41...72
    Code::upper(8, 73), // 73...∞
];

/// Table B.13 - Standard Huffman table M (HTOOB = 0)
#[rustfmt::skip]
const TABLE_M: &[Code] = &[
    Code::value(1, 0, 1), // 1
    Code::value(3, 0, 2), // 2
    Code::value(4, 0, 3), // 3
    Code::value(5, 0, 4), // 4
    Code::value(4, 1, 5), // 5...6
    Code::value(3, 3, 7), // 7...14
    Code::value(6, 1, 15), // 15...16
    Code::value(6, 2, 17), // 17...20
    Code::value(6, 3, 21), // 21...28
    Code::value(6, 4, 29), // 29...44
    Code::value(6, 5, 45), // 45...76
    Code::value(7, 6, 77), // 77...140
    Code::upper(7, 141), // 141...∞
];

/// Table B.14 - Standard Huffman table N (HTOOB = 0)
#[rustfmt::skip]
const TABLE_N: &[Code] = &[
    Code::value(3, 0, -2), // -2
    Code::value(3, 0, -1), // -1
    Code::value(1, 0, 0), // 0
    Code::value(3, 0, 1), // 1
    Code::value(3, 0, 2), // 2
];

/// Table B.15 - Standard Huffman table O (HTOOB = 0)
#[rustfmt::skip]
const TABLE_O: &[Code] = &[
    Code::value(7, 4, -24), // -24...-9
    Code::value(6, 2, -8), // -8...-5
    Code::value(5, 1, -4), // -4...-3
    Code::value(4, 0, -2), // -2
    Code::value(3, 0, -1), // -1
    Code::value(1, 0, 0), // 0
    Code::value(3, 0, 1), // 1
    Code::value(4, 0, 2), // 2
    Code::value(5, 1, 3), // 3...4
    Code::value(6, 2, 5), // 5...8
    Code::value(7, 4, 9), // 9...24
    Code::lower(7, -25), // -∞...-25
    Code::upper(7, 25), // 25...∞
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::huffman::bits_to_bytes;
    use crate::reader::Reader;
    use crate::writer::Writer;

    /// Bit strings made of the canonical prefixes of each table, followed by
    /// the values they decode to.
    #[rustfmt::skip]
    const VECTORS: &[(u8, &str, &[Option<i32>])] = &[
        (1, "000000111110000000001011111111110000000000000000011011111111111111111110000000000000000000000000000000011100000000000000000001000001100000", &[Some(0), Some(15), Some(16), Some(271), Some(272), Some(65807), Some(65808), Some(70000)]),
        (2, "0101101110000111011111110000000111101111111111100000000000000000000000000000000011111000000000000000000000001110011101111111", &[Some(0), Some(1), Some(2), Some(3), Some(10), Some(11), Some(74), Some(75), Some(1000), None]),
        (3, "11111110000000001111111011111111011011101111111011111111111111000000000000000000000000000000001111111100000000000000000000001011100111111111000000000000000000000000000000000111110", &[Some(-256), Some(-1), Some(0), Some(2), Some(10), Some(74), Some(-257), Some(-1000), Some(75), None]),
        (4, "01011011100001110111111100000001111011111111111000000000000000000000000000000001111100000000000000000000000110101000", &[Some(1), Some(2), Some(3), Some(4), Some(11), Some(12), Some(75), Some(76), Some(500)]),
        (5, "1111110000000001111110111111110111000011110000000111101111111111111000000000000000000000000000000001111111000000000000000000000000001011001111100000000000000000000000000000000011111000000000000000000000000000011000", &[Some(-255), Some(0), Some(1), Some(4), Some(12), Some(75), Some(-256), Some(-300), Some(76), Some(100)]),
        (6, "11100000000000011100111111111110000000000001111011111000000000001111111010000000011001111010001101111111111111111000000000000000000000000000000000111110000000000000000000001011100001111111110000000000000000000000000000000011111100000000000000000001111100001111", &[Some(-2048), Some(-1025), Some(-1024), Some(-33), Some(0), Some(127), Some(128), Some(1000), Some(2047), Some(-2049), Some(-5000), Some(2048), Some(9999)]),
        (7, "100000000000010101111110110000010111111111100000000111111111111111100000000000000000000000000000000011110000000000000000000000000010010111111100000000000000000000000000000000", &[Some(-1024), Some(-1), Some(0), Some(31), Some(32), Some(2047), Some(-1025), Some(-1100), Some(2048)]),
        (8, "11111100000111111001111111111000111111101111110010100000011101011101010000001110111111110111111111111101111111111111111111000000000000000000000000000000000111111110000000000000000000000000000001001111111110000000000000000000000000000000001", &[Some(-15), Some(-8), Some(-7), Some(-3), Some(-2), Some(-1), Some(0), Some(1), Some(2), Some(3), Some(4), Some(21), Some(645), Some(1669), Some(-16), Some(-20), Some(1670), None]),
        (9, "11111100000010100010001010110100000001111011111111111111111111000000000000000000000000000000000111111110000000000000000000000000000010001111111110000000000000000000000000000000000", &[Some(-31), Some(-3), Some(-1), Some(0), Some(1), Some(7), Some(3338), Some(-32), Some(-40), Some(3339), None]),
        (10, "11110100000111111000000001111001010000000111111111111011111111111111111110000000000000000000000000000000001111111000000000000000000000000000001000111111110000000000000000000000000000000010", &[Some(-21), Some(-5), Some(-2), Some(1), Some(2), Some(6), Some(69), Some(4165), Some(-22), Some(-30), Some(4166), None]),
        (11, "010010111001111110111111111111100000000000000000000000000000000111111100000000000000000000000000111011", &[Some(1), Some(2), Some(3), Some(4), Some(140), Some(141), Some(200)]),
        (12, "01011011111010111111101111111111111000000000000000000000000000000001111111100000000000000000000000000000111", &[Some(1), Some(2), Some(4), Some(10), Some(72), Some(73), Some(80)]),
        (13, "01001010001011111111110111111111111100000000000000000000000000000000111111100000000000000000000000000001001", &[Some(1), Some(2), Some(7), Some(14), Some(140), Some(141), Some(150)]),
        (14, "1001010110111", &[Some(-2), Some(-1), Some(0), Some(1), Some(2)]),
        (15, "111110000001111100111111110000100010111111011111111111000000000000000000000000000000000111111000000000000000000000000000000001111111100000000000000000000000000000000111111100000000000000000000000000000101", &[Some(-24), Some(-9), Some(-8), Some(-1), Some(0), Some(1), Some(24), Some(-25), Some(-26), Some(25), Some(30)]),
    ];

    #[test]
    fn known_bit_patterns() {
        for &(n, bits, expected) in VECTORS {
            let table = standard_table(n).unwrap();
            let data = bits_to_bytes(bits);
            let mut reader = Reader::new(&data);

            for (i, &value) in expected.iter().enumerate() {
                assert_eq!(
                    table.decode(&mut reader).unwrap(),
                    value,
                    "table B.{n}, value {i}"
                );
            }

            assert_eq!(reader.byte_pos() * 8 + reader.bit_pos(), bits.len());
        }
    }

    #[test]
    fn encoding_reproduces_patterns() {
        for &(n, bits, values) in VECTORS {
            let table = standard_table(n).unwrap();
            let mut writer = Writer::new();

            for &value in values {
                table.encode(value, &mut writer).unwrap();
            }

            assert_eq!(writer.finish(), bits_to_bytes(bits), "table B.{n}");
        }
    }

    #[test]
    fn oob_lines() {
        let with_oob: Vec<u8> = (1..=15)
            .filter(|&n| standard_table(n).unwrap().has_oob())
            .collect();

        assert_eq!(with_oob, vec![2, 3, 8, 9, 10]);
    }

    #[test]
    fn construction_is_idempotent() {
        for n in 1..=15 {
            let cached = standard_table(n).unwrap().to_string();
            let fresh = HuffmanTable::build(LINES[usize::from(n) - 1])
                .unwrap()
                .to_string();

            assert_eq!(cached, fresh);
            assert_eq!(cached, standard_table(n).unwrap().to_string());
        }
    }

    #[test]
    fn table_b2_rendering() {
        assert_eq!(
            standard_table(2).unwrap().to_string(),
            "0: 0..=0\n10: 1..=1\n110: 2..=2\n1110: 3..=10\n11110: 11..=74\n\
             111110: 75..\n111111: OOB\n"
        );
    }

    #[test]
    fn unknown_tables() {
        for n in [0, 16, 255] {
            assert_eq!(
                standard_table(n).unwrap_err(),
                DecodeError::Huffman(HuffmanError::UnknownStandardTable(n))
            );
        }
    }
}
