//! Tax distribution across public-spending sectors
//!
//! A [`DistributionTable`] is an immutable, versioned value: the ledger holds
//! the one it was configured with, and callers may pass any other table to
//! [`distribute`] directly.
//!
//! Amounts are apportioned with the largest-remainder method at cent
//! precision: every share is truncated to cents, then the leftover cents go
//! one at a time to the shares with the largest truncated fractions. Sector
//! rows plus the unallocated row therefore add up to the input exactly, and
//! each row is within one cent of its exact share.

use crate::{
    types::{round_currency, DistributionEntry, CURRENCY_SCALE},
    Error, Result,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Subsector share of a sector amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsectorShare {
    /// Subsector name
    pub name: String,
    /// Fraction of the sector amount
    pub percentage: Decimal,
}

/// Sector share of the total tax
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorShare {
    /// Sector name
    pub name: String,
    /// Fraction of the total tax
    pub percentage: Decimal,
    /// Internal breakdown of the sector amount
    #[serde(default)]
    pub breakdown: Vec<SubsectorShare>,
}

/// Versioned sector/subsector percentage table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionTable {
    /// Table version
    pub version: u32,
    /// Sector name reported for the unallocated remainder
    pub remainder_sector: String,
    /// Configured sectors, in output order
    pub sectors: Vec<SectorShare>,
}

impl DistributionTable {
    /// Sum of all sector percentages
    pub fn total_percentage(&self) -> Decimal {
        self.sectors.iter().map(|s| s.percentage).sum()
    }

    /// Fraction left once every sector has been served (never negative)
    pub fn remainder_percentage(&self) -> Decimal {
        (Decimal::ONE - self.total_percentage()).max(Decimal::ZERO)
    }

    /// Look up a sector by name
    pub fn sector(&self, name: &str) -> Option<&SectorShare> {
        self.sectors.iter().find(|s| s.name == name)
    }

    /// Reject out-of-range percentages and over-allocation
    pub fn validate(&self) -> Result<()> {
        for sector in &self.sectors {
            check_fraction(&sector.name, sector.percentage)?;
            for sub in &sector.breakdown {
                check_fraction(&sub.name, sub.percentage)?;
            }
            let breakdown: Decimal = sector.breakdown.iter().map(|s| s.percentage).sum();
            if breakdown > Decimal::ONE {
                return Err(Error::Config(format!(
                    "Sector {} breakdown allocates {} of its amount",
                    sector.name, breakdown
                )));
            }
        }

        let total = self.total_percentage();
        if total > Decimal::ONE {
            return Err(Error::Config(format!(
                "Distribution table v{} allocates {} of the tax",
                self.version, total
            )));
        }

        Ok(())
    }
}

fn check_fraction(name: &str, pct: Decimal) -> Result<()> {
    if pct < Decimal::ZERO || pct > Decimal::ONE {
        return Err(Error::Config(format!(
            "Percentage for {} must be within [0, 1], got {}",
            name, pct
        )));
    }
    Ok(())
}

fn pct(percent: i64) -> Decimal {
    Decimal::new(percent, 2)
}

fn sector(name: &str, percentage: i64, breakdown: &[(&str, i64)]) -> SectorShare {
    SectorShare {
        name: name.to_string(),
        percentage: pct(percentage),
        breakdown: breakdown
            .iter()
            .map(|(n, p)| SubsectorShare {
                name: n.to_string(),
                percentage: pct(*p),
            })
            .collect(),
    }
}

impl Default for DistributionTable {
    fn default() -> Self {
        Self {
            version: 1,
            remainder_sector: "Otros".to_string(),
            sectors: vec![
                sector(
                    "Salud",
                    8,
                    &[
                        ("Nómina de personal", 50),
                        ("Insumos médicos", 30),
                        ("Mantenimiento de hospitales", 20),
                    ],
                ),
                sector(
                    "Educación",
                    7,
                    &[
                        ("Salarios docentes", 60),
                        ("Materiales escolares", 25),
                        ("Construcción y mantenimiento de escuelas", 15),
                    ],
                ),
                sector(
                    "Infraestructura vial",
                    10,
                    &[
                        ("Construcción de vías", 50),
                        ("Mantenimiento de puentes", 30),
                        ("Señalización y seguridad", 20),
                    ],
                ),
                sector(
                    "Ambiente",
                    5,
                    &[
                        ("Proyectos de reforestación", 40),
                        ("Gestión de residuos", 30),
                        ("Educación ambiental", 30),
                    ],
                ),
                sector(
                    "Cultura y deporte",
                    3,
                    &[
                        ("Programas culturales", 60),
                        ("Instalaciones deportivas", 40),
                    ],
                ),
                sector(
                    "Seguridad",
                    12,
                    &[
                        ("Equipamiento policial", 40),
                        ("Tecnología de seguridad", 35),
                        ("Capacitación", 25),
                    ],
                ),
                sector(
                    "Administración",
                    5,
                    &[
                        ("Sistemas tecnológicos", 50),
                        ("Capacitación funcionarios", 30),
                        ("Infraestructura administrativa", 20),
                    ],
                ),
            ],
        }
    }
}

/// Split `total` into cent amounts proportional to `weights`
///
/// `weights` must sum to one for the parts to sum to `total`.
fn apportion(total: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let exact: Vec<Decimal> = weights.iter().map(|w| total * *w).collect();
    let mut parts: Vec<Decimal> = exact
        .iter()
        .map(|v| v.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::ToZero))
        .collect();

    let unit = Decimal::new(1, CURRENCY_SCALE);
    let mut leftover = total - parts.iter().copied().sum::<Decimal>();

    let mut order: Vec<usize> = (0..parts.len()).collect();
    // Stable sort keeps table order among equal fractions
    order.sort_by(|&a, &b| (exact[b] - parts[b]).cmp(&(exact[a] - parts[a])));

    for idx in order {
        if leftover < unit {
            break;
        }
        parts[idx] += unit;
        leftover -= unit;
    }

    parts
}

/// Distribute a tax amount over the sectors of `table`
///
/// Emits, per sector, one sector row followed by one row per subsector, then
/// an unallocated row when the table leaves a positive remainder. The input is
/// rounded to cents first. An over-allocated table is a `Config` error.
pub fn distribute(total_tax_amount: Decimal, table: &DistributionTable) -> Result<Vec<DistributionEntry>> {
    table.validate()?;

    if total_tax_amount.is_sign_negative() && !total_tax_amount.is_zero() {
        return Err(Error::Validation(format!(
            "Tax amount must not be negative, got {}",
            total_tax_amount
        )));
    }

    let total = round_currency(total_tax_amount);
    let remainder = table.remainder_percentage();

    let mut weights: Vec<Decimal> = table.sectors.iter().map(|s| s.percentage).collect();
    if remainder > Decimal::ZERO {
        weights.push(remainder);
    }
    let sector_amounts = apportion(total, &weights);

    let mut entries = Vec::new();
    for (sector, &amount) in table.sectors.iter().zip(&sector_amounts) {
        entries.push(DistributionEntry {
            sector: sector.name.clone(),
            percentage: sector.percentage,
            amount,
            subsector: None,
            subsector_percentage: None,
            subsector_amount: None,
        });

        let mut sub_weights: Vec<Decimal> = sector.breakdown.iter().map(|s| s.percentage).collect();
        let unassigned = Decimal::ONE - sub_weights.iter().copied().sum::<Decimal>();
        if unassigned > Decimal::ZERO {
            sub_weights.push(unassigned);
        }
        let sub_amounts = apportion(amount, &sub_weights);

        for (sub, &sub_amount) in sector.breakdown.iter().zip(&sub_amounts) {
            entries.push(DistributionEntry {
                sector: sector.name.clone(),
                percentage: sector.percentage,
                amount,
                subsector: Some(sub.name.clone()),
                subsector_percentage: Some(sub.percentage),
                subsector_amount: Some(sub_amount),
            });
        }
    }

    if remainder > Decimal::ZERO {
        let amount = sector_amounts[table.sectors.len()];
        entries.push(DistributionEntry {
            sector: table.remainder_sector.clone(),
            percentage: remainder,
            amount,
            subsector: None,
            subsector_percentage: None,
            subsector_amount: None,
        });
    }

    Ok(entries)
}

/// Sum of the sector-level rows of a distribution
pub fn sector_total(entries: &[DistributionEntry]) -> Decimal {
    entries
        .iter()
        .filter(|e| e.is_sector_total())
        .map(|e| e.amount)
        .sum()
}
