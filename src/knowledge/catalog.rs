// Ayurvedic vocabulary. Each inner slice is one synonym group: the common
// name first, then scientific or alternate names.

pub const HERBS: &[&[&str]] = &[
    &["ashwagandha", "withania somnifera"],
    &["turmeric", "curcuma longa", "curcumin"],
    &["brahmi", "bacopa monnieri"],
    &["tulsi", "ocimum sanctum", "holy basil"],
    &["amla", "emblica officinalis"],
    &["neem", "azadirachta indica"],
    &["guduchi", "tinospora cordifolia"],
    &["shankhpushpi", "convolvulus pluricaulis"],
    &["arjuna", "terminalia arjuna"],
    &["shatavari", "asparagus racemosus"],
    &["gokshura", "tribulus terrestris"],
    &["punarnava", "boerhavia diffusa"],
];

pub const FORMULATIONS: &[&[&str]] = &[
    &["triphala"],
    &["chyawanprash"],
    &["saraswatarishta"],
    &["dashmularishta"],
    &["arjunarishta"],
    &["ashokarishta"],
    &["brahmi ghrita"],
    &["medhya rasayana"],
];

pub const PRACTICES: &[&[&str]] = &[
    &["panchakarma"],
    &["abhyanga"],
    &["shirodhara"],
    &["nasya"],
    &["basti"],
    &["virechana"],
    &["vamana"],
    &["raktamokshana"],
    &["yoga"],
    &["pranayama"],
    &["meditation"],
];

pub const CONCEPTS: &[&[&str]] = &[
    &["dosha"],
    &["vata"],
    &["pitta"],
    &["kapha"],
    &["ama"],
    &["ojas"],
    &["tejas"],
    &["prana"],
    &["rasayana"],
    &["vajikarana"],
    &["medhya"],
    &["balya"],
    &["dipana"],
    &["pachana"],
];

pub const CONDITIONS: &[&[&str]] = &[
    &["anxiety", "stress"],
    &["depression"],
    &["diabetes"],
    &["arthritis"],
    &["hypertension"],
    &["insomnia", "sleep"],
    &["digestive disorders"],
    &["respiratory disorders"],
    &["skin diseases"],
    &["inflammation"],
];

pub const INCLUDE_KEYWORDS: &[&str] = &[
    "ayurveda",
    "ayurvedic",
    "triphala",
    "ashwagandha",
    "turmeric",
    "panchakarma",
    "dosha",
    "vata",
    "pitta",
    "kapha",
    "rasayana",
    "herbal remedy",
    "natural remedy",
    "brahmi",
    "tulsi",
];

pub const EXCLUDE_KEYWORDS: &[&str] = &[
    "antibiotic",
    "chemotherapy",
    "radiotherapy",
    "antiviral",
    "vaccine",
    "corticosteroids",
    "ibuprofen",
    "antidepressant",
    "metformin",
    "placebo-controlled",
    "oncology",
    "radiation",
    "pharmaceutical",
    "prescription drugs",
];
