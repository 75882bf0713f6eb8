//! Генерация кода и отрисовка PNG-капчи (всё в памяти, без временных файлов).

use ::image::{imageops, ImageBuffer, Rgba, RgbaImage};
use ::imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use ::imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use anyhow::Result;
use rand::{rng, Rng};
use rusttype::{Font, Scale};

/// Латиница и цифры без неоднозначных символов (l, I, 1, o, O, 0).
const ALPHABET: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P',
    'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '2', '3', '4', '5', '6', '7', '8', '9',
];

pub const CODE_LEN: usize = 5;

/// Сравнение ответа регистронезависимое, поэтому дольше 6 символов не принимаем.
pub const MAX_ANSWER_LEN: usize = 6;

const WIDTH: u32 = 200;
const HEIGHT: u32 = 80;

// Каждый символ рендерится в отдельную прозрачную плитку, которую потом вращаем.
const TILE_W: u32 = 46;
const TILE_H: u32 = 60;
const GLYPH_SCALE: f32 = 38.0;
const CHAR_STEP: i64 = 32;

const NOISE_LINES: usize = 5;
const NOISE_DOTS: usize = 100;

pub fn gen_code() -> String {
    let mut r = rng();
    (0..CODE_LEN)
        .map(|_| {
            let idx = r.random_range(0..ALPHABET.len());
            ALPHABET[idx]
        })
        .collect()
}

pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Рисуем капчу: тёмные символы с разбросом и поворотом на белом фоне,
/// поверх — светло-серые линии и точки-помехи.
pub fn render_captcha_png(code: &str) -> Result<Vec<u8>> {
    let font_data: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");
    let font = Font::try_from_bytes(font_data).ok_or_else(|| anyhow::anyhow!("Invalid font"))?;

    let mut img: RgbaImage = ImageBuffer::from_pixel(WIDTH, HEIGHT, Rgba([255, 255, 255, 255]));
    let mut r = rng();

    for (i, ch) in code.chars().enumerate() {
        let tile = glyph_tile(&font, ch, &mut r);

        // overlay обрезает выход за края, поэтому разброс безопасен
        let x = 12 + i as i64 * CHAR_STEP + r.random_range(-5..=5);
        let y = 8 + r.random_range(-8..=8);
        imageops::overlay(&mut img, &tile, x, y);
    }

    scatter_noise(&mut img, &mut r);

    // PNG в память
    let mut buf = Vec::new();
    {
        let mut encoder = ::image::codecs::png::PngEncoder::new(&mut buf);
        use ::image::ColorType;
        encoder.encode(&img, WIDTH, HEIGHT, ColorType::Rgba8)?;
    }
    Ok(buf)
}

/// Символ на прозрачной плитке, повёрнутый на случайный угол до ±25°.
fn glyph_tile(font: &Font<'_>, ch: char, r: &mut impl Rng) -> RgbaImage {
    let ink = Rgba([
        r.random_range(0..=100),
        r.random_range(0..=100),
        r.random_range(0..=100),
        255,
    ]);

    let mut tile: RgbaImage = ImageBuffer::from_pixel(TILE_W, TILE_H, Rgba([0, 0, 0, 0]));
    let scale = Scale {
        x: GLYPH_SCALE,
        y: GLYPH_SCALE,
    };
    draw_text_mut(&mut tile, ink, 10, 8, scale, font, &ch.to_string());

    let theta = r.random_range(-25.0_f32..=25.0).to_radians();
    rotate_about_center(&tile, theta, Interpolation::Bilinear, Rgba([0, 0, 0, 0]))
}

/// Помехи рисуются после текста, чтобы перечёркивать символы.
fn scatter_noise(img: &mut RgbaImage, r: &mut impl Rng) {
    let (w, h) = (img.width() as f32, img.height() as f32);

    for _ in 0..NOISE_LINES {
        let start = (r.random_range(0.0..w), r.random_range(0.0..h));
        let end = (r.random_range(0.0..w), r.random_range(0.0..h));
        let color = Rgba([
            r.random_range(150..=200),
            r.random_range(150..=200),
            r.random_range(150..=200),
            255,
        ]);
        draw_line_segment_mut(img, start, end, color);
    }

    for _ in 0..NOISE_DOTS {
        let x = r.random_range(0..img.width());
        let y = r.random_range(0..img.height());
        let color = Rgba([
            r.random_range(100..=200),
            r.random_range(100..=200),
            r.random_range(100..=200),
            255,
        ]);
        img.put_pixel(x, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_drawn_from_alphabet() {
        let s = gen_code();
        assert_eq!(s.chars().count(), CODE_LEN);
        assert!(s.chars().all(|ch| ALPHABET.contains(&ch)));
    }

    #[test]
    fn alphabet_has_no_ambiguous_chars() {
        for bad in ['l', 'I', '1', 'o', 'O', '0'] {
            assert!(!ALPHABET.contains(&bad), "{bad} не должен попадать в код");
        }
    }

    #[test]
    fn normalize_strips_spaces_and_case() {
        assert_eq!(normalize(" a B  3 "), "ab3");
        assert_eq!(normalize("XyZ"), "xyz");
    }

    #[test]
    fn glyph_tile_is_painted() {
        let font = Font::try_from_bytes(include_bytes!("../../assets/DejaVuSans-Bold.ttf") as &[u8])
            .unwrap();
        let tile = glyph_tile(&font, 'W', &mut rng());
        assert!(tile.pixels().any(|p| p.0[3] > 0), "плитка осталась пустой");
    }

    #[test]
    fn renders_nonempty_png() {
        let png = render_captcha_png("aB3dE").unwrap();
        assert!(png.len() > 1024);
    }
}
