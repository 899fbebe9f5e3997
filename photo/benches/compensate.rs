use criterion::{criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use pano_photo::{compensate, solve_gains_accurate, GainParams};
use pano_core::rgb_to_luma;

fn panorama(n: usize, w: u32, h: u32) -> (Vec<RgbImage>, Vec<GrayImage>) {
    let step = w / (n as u32 + 1);
    let images = (0..n)
        .map(|i| {
            let v = 90 + (i as u8) * 20;
            RgbImage::from_pixel(w, h, Rgb([v, v, v]))
        })
        .collect();
    let masks = (0..n as u32)
        .map(|i| {
            let mut m = GrayImage::new(w, h);
            for y in 0..h {
                for x in i * step..(i + 2) * step {
                    m.put_pixel(x, y, Luma([255]));
                }
            }
            m
        })
        .collect();
    (images, masks)
}

fn bench_gain_solve(c: &mut Criterion) {
    let (images, masks) = panorama(4, 1280, 720);
    let lumas: Vec<GrayImage> = images.iter().map(rgb_to_luma).collect();
    let params = GainParams::default();

    c.bench_function("solve_gains_accurate 4x1280x720", |b| {
        b.iter(|| solve_gains_accurate(&lumas, &masks, &params))
    });
}

fn bench_full_compensation(c: &mut Criterion) {
    let (images, masks) = panorama(4, 1280, 720);
    let params = GainParams::default();

    c.bench_function("compensate 4x1280x720", |b| {
        b.iter(|| compensate(&images, &masks, &params))
    });
}

criterion_group!(benches, bench_gain_solve, bench_full_compensation);
criterion_main!(benches);
