use criterion::Criterion;

use mzfitter::{fit_batch, Fitter1D, FitterConfig, RawDataArray};

fn elution_profile(center: f64) -> RawDataArray<'static> {
    let times: Vec<f64> = (0..120).map(|i| i as f64 * 0.1).collect();
    let intensity = times
        .iter()
        .map(|t| {
            let d = t - center;
            let tail = if d > 0.0 { (-d / 1.5).exp() } else { 1.0 };
            1e4 * (-0.5 * d * d / 0.36).exp() * tail + 20.0 * (t * 13.0).sin().abs()
        })
        .collect();
    RawDataArray::from((times, intensity))
}

fn envelope() -> RawDataArray<'static> {
    let mzs: Vec<f64> = (0..300).map(|i| 699.8 + i as f64 * 0.005).collect();
    let peaks = [(700.0, 100.0), (700.3336, 75.0), (700.6671, 35.0), (701.0006, 12.0)];
    let intensity = mzs
        .iter()
        .map(|x| {
            peaks
                .iter()
                .map(|(mu, h)| h * (-0.5 * (x - mu).powi(2) / 0.03f64.powi(2)).exp())
                .sum()
        })
        .collect();
    RawDataArray::from((mzs, intensity))
}

fn profile_fitting(c: &mut Criterion) {
    let data = elution_profile(5.0);
    let config = FitterConfig::default();
    for fitter in [
        Fitter1D::Gauss,
        Fitter1D::LmaGauss,
        Fitter1D::BiGauss,
        Fitter1D::Emg,
        Fitter1D::LogNormal,
    ] {
        c.bench_function(fitter.product_name(), |b| {
            b.iter(|| fitter.fit1d(&data, &config).unwrap())
        });
    }
}

fn isotope_fitting(c: &mut Criterion) {
    let data = envelope();
    let config = FitterConfig::builder()
        .interpolation_step(0.005)
        .build()
        .unwrap();
    for fitter in [Fitter1D::Isotope, Fitter1D::LmaIsotope] {
        c.bench_function(fitter.product_name(), |b| {
            b.iter(|| fitter.fit1d(&data, &config).unwrap())
        });
    }
}

fn batch_fitting(c: &mut Criterion) {
    let inputs: Vec<_> = (0..64).map(|i| elution_profile(3.0 + (i % 8) as f64 * 0.7)).collect();
    let config = FitterConfig::default();
    c.bench_function("batch_emg", |b| {
        b.iter(|| fit_batch(Fitter1D::Emg, &config, &inputs))
    });
}

fn fitting(c: &mut Criterion) {
    profile_fitting(c);
    isotope_fitting(c);
    batch_fitting(c);
}

criterion::criterion_group!(benches, fitting);
criterion::criterion_main!(benches);
