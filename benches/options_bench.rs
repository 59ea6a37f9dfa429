use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rfpdf::params::RequestParams;
use rfpdf::pdf_options::build_pdf_options;
use rfpdf::RenderTarget;

fn bench_build_pdf_options(c: &mut Criterion) {
    let params = RequestParams::new()
        .with_path("filename", "report.pdf")
        .with_query("format", "A4")
        .with_query("landscape", "true")
        .with_query("scale", "0.8")
        .with_query("margin", "1cm 2cm")
        .with_query("margin[top]", "0.5in")
        .with_query("pageRanges", "1-5");

    c.bench_function("build_pdf_options", |b| {
        b.iter(|| build_pdf_options(black_box(&params)).unwrap())
    });

    let rejected = RequestParams::new().with_query("format", "B5").with_query("scale", "big");
    c.bench_function("build_pdf_options_rejected", |b| {
        b.iter(|| build_pdf_options(black_box(&rejected)).unwrap_err())
    });
}

fn bench_data_url(c: &mut Criterion) {
    let html = format!("<html><body>{}</body></html>", "<p>paragraph</p>".repeat(2000));
    let target = RenderTarget::Html(html);

    c.bench_function("html_data_url_32k", |b| b.iter(|| black_box(&target).navigable_url()));
}

criterion_group!(benches, bench_build_pdf_options, bench_data_url);
criterion_main!(benches);
