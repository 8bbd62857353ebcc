use rand::Rng;
use rust_decimal::Decimal;

use crate::model::models::{BudgetItem, EducationRecord, GenderedCount, JobRecord, PopulationRecord, ReligionRecord};

/**
 * Religions as `(id, name, icon, share of the non-Islam population)`. Islam takes
 * the leading share of the whole population.
 */
const RELIGION_TEMPLATES: [(&str, &str, &str, f64); 7] = [
    ("islam", "Islam", "fa-moon", 1.0),
    ("kristen", "Kristen", "fa-cross", 0.4),
    ("katolik", "Katolik", "fa-cross", 0.3),
    ("hindu", "Hindu", "fa-om", 0.15),
    ("buddha", "Buddha", "fa-dharmachakra", 0.1),
    ("khonghucu", "Khonghucu", "fa-yin-yang", 0.03),
    ("kepercayaan", "Kepercayaan", "fa-pray", 0.02),
];

/**
 * Occupations as `(id, label, base count, male ratio)`.
 */
const JOB_TEMPLATES: [(&str, &str, i64, f64); 99] = [
    ("belum-tidak-bekerja", "BELUM/TIDAK BEKERJA", 1250, 0.45),
    ("mengurus-rumah-tangga", "MENGURUS RUMAH TANGGA", 2100, 0.01),
    ("pelajar-mahasiswa", "PELAJAR/MAHASISWA", 1800, 0.51),
    ("pensiunan", "PENSIUNAN", 410, 0.60),
    ("pegawai-negeri-sipil-pns", "PEGAWAI NEGERI SIPIL (PNS)", 950, 0.48),
    ("tentara-nasional-indonesia", "TENTARA NASIONAL INDONESIA", 820, 0.97),
    ("kepolisian-ri-polri", "KEPOLISIAN RI (POLRI)", 780, 0.94),
    ("perdagangan", "PERDAGANGAN", 750, 0.48),
    ("petani-pekebun", "PETANI/PEKEBUN", 1500, 0.80),
    ("peternak", "PETERNAK", 380, 0.75),
    ("nelayan-perikanan", "NELAYAN/PERIKANAN", 390, 0.88),
    ("industri", "INDUSTRI", 680, 0.70),
    ("konstruksi", "KONSTRUKSI", 590, 0.96),
    ("transportasi", "TRANSPORTASI", 470, 0.92),
    ("karyawan-swasta", "KARYAWAN SWASTA", 1900, 0.58),
    ("karyawan-bumn", "KARYAWAN BUMN", 720, 0.62),
    ("karyawan-bumd", "KARYAWAN BUMD", 430, 0.61),
    ("karyawan-honorer", "KARYAWAN HONORER", 450, 0.42),
    ("buruh-harian-lepas", "BURUH HARIAN LEPAS", 650, 0.72),
    ("buruh-tani-perkebunan", "BURUH TANI/PERKEBUNAN", 810, 0.78),
    ("buruh-nelayan-perikanan", "BURUH NELAYAN/PERIKANAN", 320, 0.85),
    ("buruh-peternakan", "BURUH PETERNAKAN", 210, 0.73),
    ("pembantu-rumah-tangga", "PEMBANTU RUMAH TANGGA", 550, 0.05),
    ("tukang-cukur", "TUKANG CUKUR", 190, 0.98),
    ("tukang-listrik", "TUKANG LISTRIK", 230, 0.99),
    ("tukang-batu", "TUKANG BATU", 250, 0.99),
    ("tukang-kayu", "TUKANG KAYU", 200, 0.99),
    ("tukang-sol-sepatu", "TUKANG SOL SEPATU", 90, 0.95),
    ("tukang-las-pandai-besi", "TUKANG LAS/PANDAI BESI", 280, 0.98),
    ("tukang-jahit", "TUKANG JAHIT", 260, 0.20),
    ("tukang-gigi", "TUKANG GIGI", 110, 0.65),
    ("penata-rias", "PENATA RIAS", 310, 0.03),
    ("penata-busana", "PENATA BUSANA", 180, 0.15),
    ("penata-rambut", "PENATA RAMBUT", 220, 0.18),
    ("mekanik", "MEKANIK", 300, 0.97),
    ("seniman", "SENIMAN", 240, 0.60),
    ("tabib", "TABIB", 130, 0.70),
    ("paraji", "PARAJI", 95, 0.08),
    ("perancang-busana", "PERANCANG BUSANA", 170, 0.12),
    ("penterjemah", "PENTERJEMAH", 200, 0.40),
    ("imam-masjid", "IMAM MASJID", 330, 0.99),
    ("pendeta", "PENDETA", 290, 0.85),
    ("pastor", "PASTOR", 150, 1.00),
    ("wartawan", "WARTAWAN", 350, 0.65),
    ("ustadz-mubaligh", "USTADZ/MUBALIGH", 400, 0.88),
    ("juru-masak", "JURU MASAK", 410, 0.45),
    ("promotor-acara", "PROMOTOR ACARA", 120, 0.55),
    ("anggota-dpr-ri", "ANGGOTA DPR RI", 580, 0.79),
    ("anggota-dpd-ri", "ANGGOTA DPD RI", 152, 0.85),
    ("anggota-bpk", "ANGGOTA BPK", 40, 0.75),
    ("presiden", "PRESIDEN", 1, 1.00),
    ("wakil-presiden", "WAKIL PRESIDEN", 1, 1.00),
    ("anggota-mahkamah-konstitusi", "ANGGOTA MAHKAMAH KONSTITUSI", 9, 0.89),
    ("anggota-kabinet-kementrian", "ANGGOTA KABINET KEMENTRIAN", 34, 0.82),
    ("duta-besar", "DUTA BESAR", 130, 0.78),
    ("gubernur", "GUBERNUR", 38, 0.92),
    ("wakil-gubernur", "WAKIL GUBERNUR", 38, 0.89),
    ("bupati", "BUPATI", 416, 0.91),
    ("wakil-bupati", "WAKIL BUPATI", 416, 0.90),
    ("walikota", "WALIKOTA", 98, 0.93),
    ("wakil-walikota", "WAKIL WALIKOTA", 98, 0.91),
    ("anggota-dprd-prop", "ANGGOTA DPRD PROP.", 2200, 0.80),
    ("anggota-dprd-kab-kot", "ANGGOTA DPRD KAB./KOT", 17600, 0.82),
    ("dosen", "DOSEN", 300, 0.58),
    ("guru", "GURU", 1400, 0.30),
    ("pilot", "PILOT", 150, 0.96),
    ("pengacara", "PENGACARA", 320, 0.75),
    ("notaris", "NOTARIS", 280, 0.45),
    ("arsitek", "ARSITEK", 260, 0.68),
    ("akuntan", "AKUNTAN", 400, 0.49),
    ("konsultan", "KONSULTAN", 380, 0.63),
    ("dokter", "DOKTER", 480, 0.52),
    ("bidan", "BIDAN", 350, 0.02),
    ("perawat", "PERAWAT", 620, 0.22),
    ("apoteker", "APOTEKER", 290, 0.35),
    ("psikiater-psikolog", "PSIKIATER/PSIKOLOG", 180, 0.38),
    ("penyiar-televisi", "PENYIAR TELEVISI", 210, 0.48),
    ("penyiar-radio", "PENYIAR RADIO", 240, 0.52),
    ("pelaut", "PELAUT", 370, 0.98),
    ("peneliti", "PENELITI", 290, 0.55),
    ("sopir", "SOPIR", 400, 0.98),
    ("pialang", "PIALANG", 160, 0.67),
    ("paranormal", "PARANORMAL", 90, 0.70),
    ("pedagang", "PEDAGANG", 1450, 0.53),
    ("perangkat-desa", "PERANGKAT DESA", 700, 0.75),
    ("kepala-desa", "KEPALA DESA", 800, 0.94),
    ("biarawan-biarawati", "BIARAWAN/BIARAWATI", 140, 0.50),
    ("wiraswasta", "WIRASWASTA", 1350, 0.68),
    ("anggota-lemb-tinggi-lainnya", "ANGGOTA LEMB. TINGGI LAINNYA", 110, 0.70),
    ("artis", "ARTIS", 250, 0.45),
    ("atlit", "ATLIT", 310, 0.72),
    ("chef", "CHEF", 200, 0.65),
    ("manajer", "MANAJER", 550, 0.60),
    ("tenaga-tata-usaha", "TENAGA TATA USAHA", 600, 0.33),
    ("operator", "OPERATOR", 480, 0.80),
    ("pekerja-pengolahan-kerajinan", "PEKERJA PENGOLAHAN KERAJINAN", 330, 0.30),
    ("teknisi", "TEKNISI", 340, 0.93),
    ("asisten-ahli", "ASISTEN AHLI", 270, 0.48),
    ("pekerjaan-lainnya", "PEKERJAAN LAINNYA", 610, 0.55),
];

/**
 * Education levels as `(id, level, base count, male ratio)`.
 */
const EDUCATION_TEMPLATES: [(&str, &str, i64, f64); 10] = [
    ("tidak-sekolah", "Tidak/Belum Sekolah", 1200, 0.52),
    ("belum-tamat-sd", "Belum Tamat SD/Sederajat", 560, 0.49),
    ("tamat-sd", "Tamat SD/Sederajat", 2100, 0.49),
    ("sltp", "SLTP/Sederajat", 1870, 0.49),
    ("slta", "SLTA/Sederajat", 2200, 0.49),
    ("diploma", "Diploma I/II", 230, 0.49),
    ("s1", "Akademi/Diploma III/S. Muda", 340, 0.49),
    ("s1-up", "Diploma IV/Strata I", 450, 0.49),
    ("s2", "Strata II", 85, 0.49),
    ("s3", "Strata III", 95, 0.53),
];

/**
 * Default revenue lines as `(id, name, amount in cents)`.
 */
const REVENUE_DEFAULTS: [(&str, &str, i64); 3] = [
    ("pad", "Pendapatan Asli Desa", 32_531_020_000),
    ("transfer", "Pendapatan Transfer", 208_964_950_000),
    ("lainnya", "Pendapatan Lain-lain", 0),
];

/**
 * Default expenditure lines as `(id, name, amount in cents)`.
 */
const EXPENDITURE_DEFAULTS: [(&str, &str, i64); 5] = [
    ("pemerintahan", "Penyelenggaraan Pemerintahan Desa", 112_378_575_634),
    ("pembangunan", "Pelaksanaan Pembangunan Desa", 118_774_400_000),
    ("kemasyarakatan", "Pembinaan Kemasyarakatan", 7_362_744_400),
    ("pemberdayaan", "Pemberdayaan Masyarakat Desa", 21_831_700_000),
    ("bencana", "Penanggulangan Bencana, Keadaan Darurat dan Mendesak", 17_309_300_000),
];

/**
 * Generated demographic documents of a fresh village.
 */
#[derive(Debug, Clone)]
pub struct DemographicSeed {
    pub population: PopulationRecord,
    pub religions: Vec<ReligionRecord>,
    pub jobs: Vec<JobRecord>,
    pub education: Vec<EducationRecord>,
}

/**
 * Splits `total` into a male and female count with a male share between 45% and 55%.
 */
fn split_gender<R: Rng>(rng: &mut R, total: i64) -> (i64, i64) {
    let male_ratio = 0.45 + rng.gen_range(0.0..0.1);
    let male = (total as f64 * male_ratio).floor() as i64;
    (male, total - male)
}

/**
 * Base count scaled by a random 80% to 120%, split by the fixed male ratio.
 */
fn scaled_counts<R: Rng>(rng: &mut R, base_count: i64, male_ratio: f64) -> (i64, i64, i64) {
    let variance = 0.8 + rng.gen_range(0.0..0.4);
    let total = (base_count as f64 * variance).floor() as i64;
    let male = (total as f64 * male_ratio).floor() as i64;
    (male, total - male, total)
}

/**
 * Generates plausible demographic figures.
 *
 * # Arguments
 * `rng`: Source of randomness.
 *
 * # Returns
 * Population of 8000 to 9000 residents with religion, job and education breakdowns.
 */
pub fn demographic_seed<R: Rng>(rng: &mut R) -> DemographicSeed {
    let total_population: i64 = rng.gen_range(8000..=9000);
    let (male, female) = split_gender(rng, total_population);

    let islam_total = (total_population as f64 * (0.85 + rng.gen_range(0.0..0.1))).floor() as i64;
    let remaining = total_population - islam_total;
    let religions = RELIGION_TEMPLATES
        .iter()
        .map(|(id, name, icon, share)| {
            let total = if *id == "islam" { islam_total } else { (remaining as f64 * share).floor() as i64 };
            let (male, female) = split_gender(rng, total);
            let mut record = ReligionRecord { id: id.to_string(), name: name.to_string(), male, female, total: 0, icon: icon.to_string() };
            record.recompute_total();
            record
        })
        .collect();

    let jobs = JOB_TEMPLATES
        .iter()
        .map(|(id, label, base_count, male_ratio)| {
            let (male, female, total) = scaled_counts(rng, *base_count, *male_ratio);
            JobRecord { id: id.to_string(), label: label.to_string(), male, female, total }
        })
        .collect();

    let education = EDUCATION_TEMPLATES
        .iter()
        .map(|(id, level, base_count, male_ratio)| {
            let (male, female, total) = scaled_counts(rng, *base_count, *male_ratio);
            EducationRecord { id: id.to_string(), level: level.to_string(), male, female, total }
        })
        .collect();

    DemographicSeed { population: PopulationRecord::new(male, female), religions, jobs, education }
}

fn budget_items(year: i32, defaults: &[(&str, &str, i64)]) -> Vec<BudgetItem> {
    defaults.iter().map(|(id, name, cents)| BudgetItem::new(id, name, Decimal::new(*cents, 2), year)).collect()
}

/**
 * Default revenue lines of `year`.
 */
pub fn default_revenue(year: i32) -> Vec<BudgetItem> {
    budget_items(year, &REVENUE_DEFAULTS)
}

/**
 * Default expenditure lines of `year`.
 */
pub fn default_expenditure(year: i32) -> Vec<BudgetItem> {
    budget_items(year, &EXPENDITURE_DEFAULTS)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_demographic_seed_ranges() {
        for seed in 0..20 {
            let data = demographic_seed(&mut StdRng::seed_from_u64(seed));
            let population = &data.population;
            assert!((8000..=9000).contains(&population.total));
            assert_eq!(population.total, population.male + population.female);
            assert!(population.male as f64 >= population.total as f64 * 0.45 - 1.0);
            assert!(population.male as f64 <= population.total as f64 * 0.55);

            assert_eq!(data.religions.len(), 7);
            let islam = &data.religions[0];
            assert!(islam.total as f64 >= population.total as f64 * 0.85 - 1.0);
            assert!(islam.total as f64 <= population.total as f64 * 0.95);
            assert!(data.religions.iter().all(|religion| religion.total == religion.male + religion.female));
            assert!(data.religions.iter().map(|religion| religion.total).sum::<i64>() <= population.total);
        }
    }

    #[test]
    fn test_job_and_education_templates() {
        let data = demographic_seed(&mut StdRng::seed_from_u64(7));
        assert_eq!(data.jobs.len(), 99);
        assert_eq!(data.education.len(), 10);
        assert!(data.jobs.iter().all(|job| job.total == job.male + job.female));
        let farmers = data.jobs.iter().find(|job| job.id == "petani-pekebun").unwrap();
        assert!((1200..=1800).contains(&farmers.total));
        let president = data.jobs.iter().find(|job| job.id == "presiden").unwrap();
        assert_eq!(president.female, 0);
    }

    #[test]
    fn test_budget_defaults() {
        let revenue = default_revenue(2024);
        let expenditure = default_expenditure(2024);
        assert_eq!(revenue.len(), 3);
        assert_eq!(expenditure.len(), 5);
        assert_eq!(revenue[1].amount, Decimal::new(2_089_649_500, 0));
        assert_eq!(expenditure[0].amount.to_string(), "1123785756.34");
        assert!(revenue.iter().chain(expenditure.iter()).all(|item| item.year == 2024));
    }
}
