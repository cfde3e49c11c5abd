//! Benchmarks for modref core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use modref::core::addrs::{ModuleInstance, Reference};
use modref::core::analyzer::Analyzer;
use modref::core::expr::Expr;
use modref::core::narrow::narrow;
use modref::core::parser::parse_module;
use modref::core::schema::{BlockSchema, ProviderSchemas};
use modref::core::types::Config;

const SCHEMAS: &str = r#"{
    "format_version": "1.0",
    "provider_schemas": {
        "registry.terraform.io/hashicorp/aws": {
            "resource_schemas": {
                "aws_security_group": {"version": 1, "block": {
                    "attributes": {
                        "name": {"type": "string", "optional": true},
                        "vpc_id": {"type": "string", "optional": true}
                    },
                    "block_types": {
                        "ingress": {"nesting_mode": "list", "block": {"attributes": {
                            "cidr_blocks": {"type": ["list", "string"], "optional": true},
                            "from_port": {"type": "number", "required": true}
                        }}}
                    }
                }}
            }
        }
    }
}"#;

fn module_yaml(ingress: usize) -> String {
    let mut yaml = String::from(
        r#"
variables:
  cidr: {}
outputs:
  sg_id: { value: "${aws_security_group.web.id}" }
resources:
  aws_security_group.web:
    name: "web-${var.cidr}"
    vpc_id: "${aws_vpc.main.id}"
    ingress:
"#,
    );
    for i in 0..ingress {
        yaml.push_str(&format!(
            "      - from_port: {}\n        cidr_blocks: [\"${{var.cidr}}\", \"${{aws_subnet.s{}.cidr_block}}\"]\n",
            i, i
        ));
    }
    yaml
}

fn fixture(ingress: usize) -> (Config, ProviderSchemas) {
    let root = parse_module(
        "modules:\n  net:\n    source: ./net\n    cidr: \"${cidrsubnet(var.base, 8, 0)}\"\n",
        "root.yaml",
    )
    .unwrap();
    let net = parse_module(&module_yaml(ingress), "net.yaml").unwrap();
    let config = Config::new(root).with_child("net", Config::new(net));
    (config, ProviderSchemas::from_json(SCHEMAS).unwrap())
}

fn bench_reference_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_extraction");
    for count in [1, 16, 128] {
        let template: String = (0..count)
            .map(|i| format!("${{lookup(var.m{i}, \"k\")}}-${{aws_instance.web[{i}].id}} "))
            .collect();
        let expr = Expr::from(template.as_str());
        group.bench_with_input(BenchmarkId::from_parameter(count), &expr, |b, expr| {
            b.iter(|| black_box(expr.references()));
        });
    }
    group.finish();
}

fn bench_narrow(c: &mut Criterion) {
    let schemas: serde_json::Value = serde_json::from_str(SCHEMAS).unwrap();
    let block: BlockSchema = serde_json::from_value(
        schemas["provider_schemas"]["registry.terraform.io/hashicorp/aws"]["resource_schemas"]
            ["aws_security_group"]["block"]
            .clone(),
    )
    .unwrap();

    let mut group = c.benchmark_group("narrow");
    for ingress in [4, 64, 512] {
        let (config, _) = fixture(ingress);
        let body = &config.descendent(&["net"]).unwrap().module.managed_resources
            ["aws_security_group.web"]
            .config;
        let steps: Reference = "aws_security_group.web.ingress[1].cidr_blocks".parse().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(ingress), body, |b, body| {
            b.iter(|| black_box(narrow(body, &block, &steps.remaining)));
        });
    }
    group.finish();
}

fn bench_meta_references(c: &mut Criterion) {
    let (config, schemas) = fixture(64);
    let analyzer = Analyzer::new(&config, &schemas);
    let net = ModuleInstance::root().child("net", None);
    let queries: Vec<(ModuleInstance, Reference)> = vec![
        (net.clone(), "var.cidr".parse().unwrap()),
        (ModuleInstance::root(), "module.net.sg_id".parse().unwrap()),
        (net.clone(), "aws_security_group.web".parse().unwrap()),
        (net, "aws_security_group.web.ingress[3]".parse().unwrap()),
    ];

    c.bench_function("meta_references", |b| {
        b.iter(|| {
            for (module, reference) in &queries {
                black_box(analyzer.meta_references(module, reference));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_reference_extraction,
    bench_narrow,
    bench_meta_references
);
criterion_main!(benches);
