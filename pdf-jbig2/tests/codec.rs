//! End-to-end tests that write streams with the encoder and read them back
//! through the public decoding API.

use pdf_jbig2::{
    Bitmap, CombinationOperator, DecodeError, DecodeSettings, Encoder, FormatError,
    GenericEncodeParams, Globals, PageFailure, ReferenceError, RefinementEncodeParams,
    RefinementTemplate, SegmentType, Segments, SymbolDictionaryEncodeParams, SymbolPlacement,
    Template, TextRegionEncodeParams, UnsupportedFeature, decode, decode_file,
    decode_with_settings, standard_table,
};
use rayon::prelude::*;

fn noise(width: u32, height: u32, seed: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height);
    let mut state = seed | 1;

    for y in 0..height {
        for x in 0..width {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            bitmap.set_pixel(x, y, state % 3 == 0);
        }
    }

    bitmap
}

fn glyph(rows: &[&str]) -> Bitmap {
    let mut bitmap = Bitmap::new(rows[0].len() as u32, rows.len() as u32);

    for (y, row) in rows.iter().enumerate() {
        for (x, c) in row.chars().enumerate() {
            bitmap.set_pixel(x as u32, y as u32, c == '#');
        }
    }

    bitmap
}

fn glyphs() -> Vec<Bitmap> {
    vec![
        glyph(&[".##.", "#..#", "####", "#..#", "#..#"]),
        glyph(&["###.", "#..#", "###.", "#..#", "###."]),
        glyph(&[".###", "#...", "#...", "#...", ".###"]),
        glyph(&["#", "#", "#"]),
        glyph(&["##", "##"]),
    ]
}

fn at(symbol: u32, x: i32, y: i32) -> SymbolPlacement {
    SymbolPlacement { symbol, x, y }
}

/// The offset of the data part of segment `number` within `stream`.
fn data_offset(stream: &[u8], number: u32) -> usize {
    let segment = Segments::embedded(stream)
        .map(|s| s.unwrap())
        .find(|s| s.header.number == number)
        .unwrap();

    segment.data.as_ptr() as usize - stream.as_ptr() as usize
}

/// A segment header with one-byte referred-to numbers and page association.
fn raw_header(number: u32, kind: u8, referred: &[u8], page: u8, len: u32) -> Vec<u8> {
    let mut out = number.to_be_bytes().to_vec();
    out.push(kind);
    out.push((referred.len() as u8) << 5);
    out.extend_from_slice(referred);
    out.push(page);
    out.extend_from_slice(&len.to_be_bytes());
    out
}

fn raw_page_info(width: u32, height: u32) -> Vec<u8> {
    let mut out = width.to_be_bytes().to_vec();
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&[0, 0, 0]);
    out
}

#[test]
fn generic_regions_all_templates() {
    let templates = [
        Template::Template0,
        Template::Template1,
        Template::Template2,
        Template::Template3,
    ];

    for template in templates {
        for tpgdon in [false, true] {
            let mut encoder = Encoder::new();
            encoder.start_page(64, 48).unwrap();

            let params = GenericEncodeParams {
                template,
                tpgdon,
                ..GenericEncodeParams::default()
            };
            encoder
                .add_generic_region(&noise(40, 30, 7), 3, 5, &params)
                .unwrap();
            encoder
                .add_generic_region(&noise(20, 20, 11), 40, 20, &params)
                .unwrap();

            let expected = encoder.end_page().unwrap();
            let document = decode(&encoder.finish(), None).unwrap();

            assert!(document.failures.is_empty());
            assert_eq!(
                document.pages[0].bitmap, expected,
                "{template:?}, TPGDON {tpgdon}"
            );
        }
    }
}

#[test]
fn refinement_on_top_of_generic_region() {
    let coarse = noise(32, 24, 3);
    let mut fine = coarse.clone();
    for i in 0..20 {
        fine.set_pixel(i, i, !coarse.get_pixel(i, i));
    }

    for template in [RefinementTemplate::Template0, RefinementTemplate::Template1] {
        let mut encoder = Encoder::new();
        encoder.start_page(48, 40).unwrap();
        encoder
            .add_generic_region(&coarse, 8, 8, &GenericEncodeParams::default())
            .unwrap();
        encoder
            .add_refinement_region(
                &fine,
                8,
                8,
                &RefinementEncodeParams {
                    template,
                    ..RefinementEncodeParams::default()
                },
            )
            .unwrap();

        let expected = encoder.end_page().unwrap();
        let document = decode(&encoder.finish(), None).unwrap();

        assert_eq!(document.pages[0].bitmap, expected);
        assert!(document.pages[0].bitmap.get_pixel(8, 8) != coarse.get_pixel(0, 0));
    }
}

#[test]
fn text_placements_are_reported() {
    let instances = [
        at(0, 2, 2),
        at(1, 7, 2),
        at(2, 12, 3),
        at(3, 20, 1),
        at(0, 2, 12),
        at(4, 9, 14),
        at(2, 30, 9),
    ];

    for log_strips in 0..=3 {
        let mut encoder = Encoder::new();
        let dictionary = encoder
            .add_symbol_dictionary(&glyphs(), &SymbolDictionaryEncodeParams::default())
            .unwrap();

        encoder.start_page(48, 24).unwrap();
        encoder
            .add_text_region(
                &[&dictionary],
                &instances,
                40,
                20,
                4,
                2,
                &TextRegionEncodeParams {
                    log_strips,
                    operator: CombinationOperator::Or,
                },
            )
            .unwrap();

        let expected = encoder.end_page().unwrap();
        let document = decode(&encoder.finish(), None).unwrap();
        let page = &document.pages[0];

        assert_eq!(page.bitmap, expected);

        let layout = &page.text_regions[0];
        assert_eq!((layout.x, layout.y), (4, 2));

        // Symbol IDs refer to the dictionary's export order.
        let mut decoded: Vec<_> = layout
            .placements
            .iter()
            .map(|p| (p.y, p.x, dictionary.symbols()[p.symbol as usize].clone()))
            .collect();
        let mut wanted: Vec<_> = instances
            .iter()
            .map(|p| (p.y, p.x, dictionary.symbols()[p.symbol as usize].clone()))
            .collect();
        decoded.sort_by_key(|(y, x, _)| (*y, *x));
        wanted.sort_by_key(|(y, x, _)| (*y, *x));

        assert_eq!(decoded, wanted, "LOGSBSTRIPS {log_strips}");
    }
}

#[test]
fn huffman_dictionary_with_partial_export() {
    let glyphs = glyphs();
    let mut encoder = Encoder::new();
    let dictionary = encoder
        .add_symbol_dictionary(
            &glyphs,
            &SymbolDictionaryEncodeParams {
                huffman: true,
                export: Some(vec![true, false, true, false, true]),
                ..SymbolDictionaryEncodeParams::default()
            },
        )
        .unwrap();

    assert_eq!(dictionary.symbols().len(), 3);
    assert_eq!(dictionary.export_index(1), None);

    let a = dictionary.export_index(0).unwrap();
    let c = dictionary.export_index(2).unwrap();
    assert_eq!(dictionary.symbols()[a as usize], glyphs[0]);

    encoder.start_page(32, 16).unwrap();
    encoder
        .add_text_region(
            &[&dictionary],
            &[at(a, 1, 1), at(c, 8, 1), at(a, 16, 6)],
            32,
            16,
            0,
            0,
            &TextRegionEncodeParams::default(),
        )
        .unwrap();

    let expected = encoder.end_page().unwrap();
    let segment = dictionary.segment_number();
    let document = decode(&encoder.finish(), None).unwrap();

    assert_eq!(document.pages[0].bitmap, expected);
    assert_eq!(
        document.symbol_dictionary(segment).unwrap().symbols(),
        dictionary.symbols()
    );
    assert_eq!(document.symbol_dictionaries().count(), 1);
}

#[test]
fn globals_shared_across_images() {
    let mut globals_encoder = Encoder::new();
    let dictionary = globals_encoder
        .add_symbol_dictionary(&glyphs(), &SymbolDictionaryEncodeParams::default())
        .unwrap();
    let first_segment = globals_encoder.next_segment_number();
    let globals_data = globals_encoder.finish();

    let layouts = [
        vec![at(0, 0, 0), at(1, 5, 0), at(2, 10, 0)],
        vec![at(4, 3, 3), at(3, 9, 1), at(0, 14, 8), at(0, 20, 8)],
    ];

    let images: Vec<(Vec<u8>, Bitmap)> = layouts
        .iter()
        .map(|instances| {
            let mut encoder = Encoder::with_first_segment(first_segment);
            encoder.start_page(32, 16).unwrap();
            encoder
                .add_text_region(
                    &[&dictionary],
                    instances,
                    32,
                    16,
                    0,
                    0,
                    &TextRegionEncodeParams::default(),
                )
                .unwrap();
            let page = encoder.end_page().unwrap();
            (encoder.finish(), page)
        })
        .collect();

    let globals = Globals::new(&globals_data);
    assert!(globals.failures().is_empty());
    assert_eq!(
        globals.symbol_dictionary(0).unwrap().symbols(),
        dictionary.symbols()
    );

    let decoded: Vec<Bitmap> = images
        .par_iter()
        .map(|(data, _)| decode(data, Some(&globals)).unwrap().pages[0].bitmap.clone())
        .collect();

    for ((_, expected), bitmap) in images.iter().zip(&decoded) {
        assert_eq!(bitmap, expected);
    }

    assert_eq!(
        decode(&images[0].0, None).unwrap_err(),
        DecodeError::InvalidReference(ReferenceError::Missing(0))
    );
}

#[test]
fn failed_page_does_not_affect_others() {
    let mut encoder = Encoder::new();
    encoder.start_page(32, 32).unwrap();
    encoder
        .add_generic_region(&noise(24, 20, 5), 4, 4, &GenericEncodeParams::default())
        .unwrap();
    let first = encoder.end_page().unwrap();

    encoder.start_page(32, 32).unwrap();
    let region = encoder
        .add_generic_region(&noise(24, 20, 9), 4, 4, &GenericEncodeParams::default())
        .unwrap();
    let mut data = encoder.finish();

    // An invalid external combination operator in the second page's region.
    let offset = data_offset(&data, region);
    data[offset + 16] = 0x07;

    let document = decode(&data, None).unwrap();

    assert_eq!(document.pages.len(), 1);
    assert_eq!(document.pages[0].number, 1);
    assert_eq!(document.pages[0].bitmap, first);
    assert_eq!(
        document.failures,
        [PageFailure {
            page: 2,
            segment: Some(region),
            error: DecodeError::MalformedSegment(FormatError::InvalidCombinationOperator),
        }]
    );
}

#[test]
fn forward_reference_fails_its_page() {
    let mut data = raw_header(0, 48, &[], 1, 19);
    data.extend(raw_page_info(8, 8));
    data.extend(raw_header(1, 6, &[5], 1, 2));
    data.extend([0xAA, 0xBB]);
    data.extend(raw_header(2, 49, &[], 1, 0));
    data.extend(raw_header(3, 48, &[], 2, 19));
    data.extend(raw_page_info(8, 8));
    data.extend(raw_header(4, 49, &[], 2, 0));

    let document = decode(&data, None).unwrap();

    assert_eq!(document.pages.len(), 1);
    assert_eq!(document.pages[0].number, 2);
    assert_eq!(document.failures.len(), 1);
    assert_eq!(document.failures[0].page, 1);
    assert_eq!(
        document.failures[0].error,
        DecodeError::InvalidReference(ReferenceError::Forward {
            segment: 1,
            referred: 5
        })
    );
}

#[test]
fn truncated_stream_keeps_finished_pages() {
    let mut encoder = Encoder::new();
    encoder.start_page(16, 16).unwrap();
    encoder
        .add_generic_region(&noise(16, 16, 1), 0, 0, &GenericEncodeParams::default())
        .unwrap();
    encoder.end_page();
    encoder.start_page(16, 16).unwrap();
    encoder
        .add_generic_region(&noise(16, 16, 2), 0, 0, &GenericEncodeParams::default())
        .unwrap();
    let data = encoder.finish();

    let cut = data_offset(&data, 4) + 10;
    let document = decode(&data[..cut], None).unwrap();

    assert_eq!(document.pages.len(), 1);
    assert_eq!(document.failures[0].page, 2);
    assert_eq!(document.failures[0].error, DecodeError::UnexpectedEndOfData);
}

#[test]
fn unknown_length_generic_region() {
    let bitmap = noise(16, 12, 21);
    let mut encoder = Encoder::new();
    encoder.start_page(16, 32).unwrap();
    let region = encoder
        .add_generic_region(&bitmap, 0, 0, &GenericEncodeParams::default())
        .unwrap();
    let stream = encoder.finish();

    let start = data_offset(&stream, region);
    let segment = Segments::embedded(&stream)
        .map(|s| s.unwrap())
        .find(|s| s.header.number == region)
        .unwrap();
    let end = start + segment.data.len();

    // Declare 20 rows, of which only 12 end up being coded.
    let mut payload = segment.data.to_vec();
    payload[4..8].copy_from_slice(&20_u32.to_be_bytes());
    payload.extend_from_slice(&12_u32.to_be_bytes());

    let mut data = stream[..start - 4].to_vec();
    data.extend_from_slice(&[0xFF; 4]);
    data.extend_from_slice(&payload);
    data.extend_from_slice(&stream[end..]);

    let document = decode(&data, None).unwrap();
    let page = &document.pages[0].bitmap;

    assert!(document.failures.is_empty());
    for y in 0..12 {
        for x in 0..16 {
            assert_eq!(page.get_pixel(x, y), bitmap.get_pixel(x, y));
        }
    }
}

#[test]
fn standalone_files() {
    let mut encoder = Encoder::new();
    encoder.start_page(24, 24).unwrap();
    encoder
        .add_generic_region(&noise(20, 20, 17), 2, 2, &GenericEncodeParams::default())
        .unwrap();
    let expected = encoder.page_bitmap().unwrap().clone();
    let next = encoder.next_segment_number();

    let mut embedded = Encoder::new();
    embedded.start_page(24, 24).unwrap();
    embedded
        .add_generic_region(&noise(20, 20, 17), 2, 2, &GenericEncodeParams::default())
        .unwrap();
    let stream = embedded.finish();

    let sequential = decode_file(&encoder.into_file()).unwrap();
    assert_eq!(sequential.pages[0].bitmap, expected);

    // Random-access organization: all headers, terminated by an end of file
    // segment, then all data parts.
    let mut headers = Vec::new();
    let mut bodies = Vec::new();
    let mut pos = 0;

    for segment in Segments::embedded(&stream) {
        let segment = segment.unwrap();
        let start = segment.data.as_ptr() as usize - stream.as_ptr() as usize;
        headers.extend_from_slice(&stream[pos..start]);
        bodies.extend_from_slice(segment.data);
        pos = start + segment.data.len();
    }

    let mut file = vec![0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0, 0, 0, 1];
    file.extend(headers);
    file.extend(raw_header(next + 1, 51, &[], 0, 0));
    file.extend(bodies);

    let random_access = decode_file(&file).unwrap();
    assert_eq!(random_access.pages[0].bitmap, expected);

    let mut not_a_file = file.clone();
    not_a_file[0] = 0;
    assert_eq!(
        decode_file(&not_a_file).unwrap_err(),
        DecodeError::MalformedSegment(FormatError::InvalidFileHeader)
    );
}

#[test]
fn pixel_limit() {
    let mut encoder = Encoder::new();
    encoder.start_page(100, 100).unwrap();
    encoder
        .add_generic_region(&noise(8, 8, 4), 0, 0, &GenericEncodeParams::default())
        .unwrap();
    let data = encoder.finish();

    let settings = |max_pixel_count| DecodeSettings {
        max_pixel_count,
        ..DecodeSettings::default()
    };

    assert_eq!(
        decode_with_settings(&data, None, &settings(9_999)).unwrap_err(),
        DecodeError::UnsupportedFeature(UnsupportedFeature::ImageTooLarge)
    );
    assert!(decode_with_settings(&data, None, &settings(10_000)).is_ok());
}

#[test]
fn segment_types_of_an_encoded_stream() {
    let mut encoder = Encoder::new();
    encoder.start_page(8, 8).unwrap();
    encoder
        .add_generic_region(&noise(8, 8, 2), 0, 0, &GenericEncodeParams::default())
        .unwrap();
    let data = encoder.finish();

    let types: Vec<_> = Segments::embedded(&data)
        .map(|s| s.unwrap().header.segment_type)
        .collect();

    assert_eq!(
        types,
        [
            SegmentType::PageInformation,
            SegmentType::ImmediateLosslessGenericRegion,
            SegmentType::EndOfPage
        ]
    );
}

#[test]
fn standard_tables_from_many_threads() {
    let rendered: Vec<String> = (1..=15_u8)
        .into_par_iter()
        .map(|n| standard_table(n).unwrap().to_string())
        .collect();

    for (n, text) in (1..=15_u8).zip(&rendered) {
        assert_eq!(&standard_table(n).unwrap().to_string(), text);
    }

    assert!(standard_table(0).is_err());
    assert!(standard_table(16).is_err());
}

#[test]
fn shared_types_are_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<Bitmap>();
    assert_send_sync::<pdf_jbig2::SymbolDictionary>();
    assert_send_sync::<Globals>();
    assert_send_sync::<pdf_jbig2::DecodedDocument>();
}
