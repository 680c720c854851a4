use crate::panel::DetailTopic;
use crate::records::{or_not_available, MedicineRecord};

pub const DOSAGE_WARNING: &str = "Aturan minum dapat berbeda-beda pada setiap orang. \
Harap ikuti petunjuk dari dokter yang sudah memeriksa kondisi Anda.";

pub fn caption(label: &str) -> String {
    format!("Hasil Deteksi: {label}")
}

/// Summary shown under the prediction and read out on manual playback.
pub fn summary(record: &MedicineRecord) -> String {
    [
        format!("Obat yang terdeteksi adalah {}.", record.name),
        format!("Golongan: {}.", or_not_available(&record.class)),
        format!("Jenis: {}.", or_not_available(&record.kind)),
        format!("Manfaat: {}.", or_not_available(&record.benefits)),
        format!("Aturan minum: {}.", or_not_available(&record.dosage)),
        format!("Perhatian: {}.", or_not_available(&record.notes)),
        format!("Peringatan: {DOSAGE_WARNING}"),
    ]
    .join(" ")
}

/// Spoken text for an opened topic.
pub fn topic_narration(record: &MedicineRecord, topic: DetailTopic) -> String {
    format!("{}{}", topic.prefix(&record.name), or_not_available(topic.field(record)))
}

/// Heading of the detail panel.
pub fn topic_title(record: &MedicineRecord, topic: DetailTopic) -> String {
    match topic {
        DetailTopic::SideEffects => format!("{} {}:", topic.title(), record.name),
        _ => format!("{}:", topic.title()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::tests::store;
    use crate::records::NOT_AVAILABLE;

    #[test]
    fn summary_follows_the_fixed_template() {
        let store = store();
        let record = store.lookup("paracetamol_500").unwrap();
        assert_eq!(
            summary(record),
            "Obat yang terdeteksi adalah Paracetamol 500mg. Golongan: Obat Bebas. Jenis: Tablet. \
             Manfaat: Meredakan demam dan nyeri. Aturan minum: 3 kali sehari 1 tablet. \
             Perhatian: Jangan melebihi dosis. Peringatan: Aturan minum dapat berbeda-beda pada \
             setiap orang. Harap ikuti petunjuk dari dokter yang sudah memeriksa kondisi Anda."
        );
    }

    #[test]
    fn topic_text_is_prefix_plus_field() {
        let store = store();
        let record = store.lookup("paracetamol_500").unwrap();
        assert_eq!(
            topic_narration(record, DetailTopic::SideEffects),
            "Efek samping dari Paracetamol 500mg: Mual ringan"
        );
        assert_eq!(
            topic_narration(record, DetailTopic::FoodRestrictions),
            format!("Pantangan makanan: {NOT_AVAILABLE}")
        );
    }

    #[test]
    fn composition_is_deterministic() {
        let store = store();
        for label in store.labels() {
            let record = store.lookup(&label).unwrap();
            assert_eq!(summary(record).as_bytes(), summary(&record.clone()).as_bytes());
            for topic in DetailTopic::ALL {
                assert_eq!(
                    topic_narration(record, topic).as_bytes(),
                    topic_narration(record, topic).as_bytes()
                );
            }
        }
    }

    #[test]
    fn titles() {
        let store = store();
        let record = store.lookup("amoxicillin_500").unwrap();
        assert_eq!(topic_title(record, DetailTopic::SideEffects), "Efek Samping Amoxicillin 500mg:");
        assert_eq!(topic_title(record, DetailTopic::MissedDose), "Jika Lupa Minum?:");
        assert_eq!(caption("amoxicillin_500"), "Hasil Deteksi: amoxicillin_500");
    }
}
