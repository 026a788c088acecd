use bmvhash::batch::{hash_files, BatchParams};
use bmvhash::{
    hash, BlockMeanHasher, BmvConfig, Comparison, ErrorKind, Hash, Matcher, NormalizedImage,
    Normalizer, PerceptualDeduper,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;

const LEVELS: [u8; 6] = [20, 60, 100, 140, 180, 220];

/// 240x240 page of 10px tiles; level picked per tile.
fn page(level: impl Fn(u32, u32) -> usize) -> GrayImage {
    GrayImage::from_fn(240, 240, |x, y| Luma([LEVELS[level(x / 10, y / 10)]]))
}

fn document() -> GrayImage {
    page(|tx, ty| ((tx + ty) % 6) as usize)
}

fn unrelated() -> GrayImage {
    page(|tx, _| (tx % 6) as usize)
}

fn png(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn jpeg(img: &GrayImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(img).unwrap();
    buf
}

fn cfg() -> BmvConfig {
    BmvConfig { side: 240, ..Default::default() }
}

fn compare(a: &GrayImage, b: &GrayImage) -> Comparison {
    Matcher::default().compare(&hash_bytes(&png(a)), &hash_bytes(&png(b))).unwrap()
}

fn hash_bytes(bytes: &[u8]) -> Hash {
    let cfg = cfg();
    let img = Normalizer::from_config(&cfg).normalize_bytes(bytes).unwrap();
    BlockMeanHasher::from_config(&cfg).hash(&img).unwrap()
}

#[test]
fn checkerboard_scenario() {
    let pixels = (0..64u32).map(|i| if (i % 8 + i / 8) % 2 == 0 { 0 } else { 255 }).collect();
    let img = NormalizedImage::from_raw(8, pixels).unwrap();
    // every 4x4 block holds eight 0s and eight 255s: mean 127.5 == median
    let h = hash(&img, 2).unwrap();
    assert_eq!(h.to_bits(), vec![true; 4]);
}

#[test]
fn same_image_hashes_identically() {
    let bytes = png(&document());
    let (a, b) = (hash_bytes(&bytes), hash_bytes(&bytes));
    assert_eq!(a.len(), 576);
    assert_eq!(a, b);
    assert_eq!(Matcher::default().compare(&a, &b).unwrap().distance, 0);
}

#[test]
fn recompressed_copy_matches() {
    let reference = hash_bytes(&png(&document()));
    let recompressed = hash_bytes(&jpeg(&document(), 85));
    let cmp = Matcher::default().compare(&reference, &recompressed).unwrap();
    assert!(cmp.is_match, "distance {}", cmp.distance);
}

#[test]
fn watermarked_copy_matches() {
    let mut marked = document();
    // bright stamp over the four tiles at the top-left corner
    for y in 0..20 {
        for x in 0..20 {
            marked.put_pixel(x, y, Luma([255]));
        }
    }
    let cmp = compare(&document(), &marked);
    assert!(cmp.distance <= 4, "distance {}", cmp.distance);
    assert!(cmp.is_match);
}

#[test]
fn slightly_cropped_copy_matches() {
    let cropped = image::imageops::crop_imm(&document(), 0, 0, 239, 239).to_image();
    let cmp = compare(&document(), &cropped);
    assert!(cmp.is_match, "distance {}", cmp.distance);
}

#[test]
fn unrelated_image_does_not_match() {
    let cmp = compare(&document(), &unrelated());
    assert_eq!(cmp.distance, 288);
    assert!(!cmp.is_match);
}

#[test]
fn hashes_from_different_grids_do_not_compare() {
    let bytes = png(&document());
    let img = Normalizer::from_config(&cfg()).normalize_bytes(&bytes).unwrap();
    let a = hash(&img, 3).unwrap();
    let b = hash(&img, 4).unwrap();
    assert_eq!((a.len(), b.len()), (9, 16));
    assert_eq!(bmvhash::distance(&a, &b).unwrap_err().kind(), ErrorKind::LengthMismatch);
}

#[test]
fn deduper_flags_reused_document() {
    let deduper = PerceptualDeduper::new(&cfg()).unwrap();
    assert!(!deduper.check_and_insert("original", &png(&document())).unwrap().is_duplicate());
    assert!(!deduper.check_and_insert("other", &png(&unrelated())).unwrap().is_duplicate());
    let out = deduper.check_and_insert("reupload", &jpeg(&document(), 85)).unwrap();
    assert_eq!(out.duplicate_of.map(|d| d.label), Some("original".to_string()));
    assert_eq!(deduper.len(), 2);
}

#[tokio::test]
async fn batch_hashes_match_single_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    document().save(&a).unwrap();
    unrelated().save(&b).unwrap();

    let out = hash_files(vec![a, b], &cfg(), BatchParams::default()).await.unwrap();
    assert_eq!(out[0].result.as_ref().unwrap(), &hash_bytes(&png(&document())));
    assert_eq!(out[1].result.as_ref().unwrap(), &hash_bytes(&png(&unrelated())));
}
