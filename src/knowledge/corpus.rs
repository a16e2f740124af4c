//! 기본 농업 지식 코퍼스
//!
//! 저장소가 비어 있을 때 시드되는 내장 지식베이스입니다.
//! 작물별 엔트리(비료/재배/병해충/관개)와 일반 주제 엔트리로 구성됩니다.

use super::store::NewEntry;

/// 작물 엔트리 정의: (작물, 시즌, [(주제, 본문)])
type CropSpec = (&'static str, &'static str, [(&'static str, &'static str); 4]);

const CROPS: &[CropSpec] = &[
    (
        "Tomato",
        "Kharif/Rabi",
        [
            (
                "Fertilizer",
                "Tomato fertilizer guide: apply well-decomposed FYM or compost at 5-7 tons/ha before planting. \
                 At transplanting give a basal fertilizer dose of DAP (400 kg/ha) or NPK 10:26:26. \
                 Tomato requires nitrogen during vegetative growth, so top-dress urea (150 kg/ha) at 30 days and 50 days. \
                 Apply potassium chloride (MOP, 100 kg/ha) at flowering to improve fruit set. \
                 Spray micronutrients zinc, boron and magnesium every 15 days. \
                 Follow split nitrogen applications and soil test recommendations for the exact fertilizer dose.",
            ),
            (
                "Cultivation",
                "Tomato grows best in well-drained loamy soil. Plant at 60cm x 60cm spacing. \
                 Needs support stakes or strings. Pinch terminal buds to control height. \
                 Harvest when fully colored but still firm. Yield: 50-60 tons/hectare with good management.",
            ),
            (
                "Pest",
                "Common tomato pests: fruit borer, whitefly, aphid. Diseases: blight, wilt, leaf spot. \
                 Control: remove infected plants, spray neem oil fortnightly, use yellow sticky traps. \
                 Avoid overhead irrigation to reduce disease.",
            ),
            (
                "Irrigation",
                "Tomato needs 400-500mm water. Drip irrigation is ideal. \
                 Water deeply 2-3 times per week during growth. \
                 Reduce frequency during flowering to improve fruiting. \
                 Maintain soil moisture but avoid waterlogging.",
            ),
        ],
    ),
    (
        "Cucumber",
        "Zaid",
        [
            (
                "Fertilizer",
                "Cucumber needs balanced nutrition. Apply DAP 300 kg/ha at sowing. \
                 Urea 100 kg/ha at 30 days, 50 kg/ha at flowering. Potassium chloride 50 kg/ha at flowering. \
                 FYM 3-5 tons/ha. Foliar spray: zinc, boron during flowering.",
            ),
            (
                "Cultivation",
                "Cucumber grows on vines; requires trellising or ground coverage. Plant at 45cm x 60cm spacing. \
                 Harvest every 2-3 days when 15-20cm long. Pollination by bees is essential. \
                 Cool weather extends harvest. Yield: 30-40 tons/hectare.",
            ),
            (
                "Pest",
                "Cucumber pests: fruit fly, spider mite, whitefly. Diseases: powdery mildew, downy mildew. \
                 Control: spray sulfur for mildew, neem for pests. Remove diseased leaves. \
                 Improve air circulation to prevent fungal diseases.",
            ),
            (
                "Irrigation",
                "Cucumber needs 300-400mm water. Drip irrigation keeps foliage dry, reducing disease. \
                 Water early morning. During fruiting, keep soil consistently moist but not waterlogged.",
            ),
        ],
    ),
    (
        "Wheat",
        "Rabi",
        [
            (
                "Fertilizer",
                "Wheat requires 60kg N, 40kg P2O5, 40kg K2O per hectare. Apply DAP 200kg/ha at planting. \
                 Urea 200kg/ha in 2 splits: 100kg/ha at tillering, 100kg/ha at boot stage. \
                 FYM 5 tons/ha. Zinc sulfate 12.5kg/ha if deficient.",
            ),
            (
                "Cultivation",
                "Wheat is a rabi (winter) crop. Sow November-December, harvest March-April. \
                 Requires 400-500mm rainfall. Seed rate: 100-120kg seed/hectare. \
                 Optimal spacing: 22-25cm rows. Yield: 40-50 quintals/hectare.",
            ),
            (
                "Pest",
                "Major wheat pests: shoot fly, armyworm, termites. Diseases: rust, smut, bunt. \
                 Control: use resistant varieties, sow on time, spray carbendazim for fungal diseases. \
                 Soil treatment for termites.",
            ),
            (
                "Irrigation",
                "Wheat needs 450-650mm water for optimal yield. \
                 Critical irrigation stages: after sowing, tillering, boot, anthesis. \
                 Total 4-5 irrigations in north India. In monsoon areas, 1-2 irrigations. Avoid waterlogging.",
            ),
        ],
    ),
    (
        "Rice",
        "Kharif",
        [
            (
                "Fertilizer",
                "Rice needs 100kg N, 50kg P2O5, 40kg K2O per hectare. \
                 Apply DAP 250kg/ha + urea 100kg/ha at transplanting. \
                 Urea 100kg/ha at tillering, 100kg/ha at panicle emergence. FYM 5 tons/ha. \
                 Micronutrients: Zn, Fe, B as needed.",
            ),
            (
                "Cultivation",
                "Rice is a kharif (monsoon) crop. Sow June-July, harvest September-October. \
                 Transplant seedlings 30-40 days old at 20cm x 15cm spacing. \
                 Maintain 5-7cm water depth during growth. Yield: 40-60 quintals/hectare.",
            ),
            (
                "Pest",
                "Rice pests: stem borer, leaf folder, brown planthopper, gall midge. \
                 Diseases: blast, sheath rot, brown spot. \
                 Control: use resistant varieties, clean fields, spray carbendazim or thiophanate-methyl. \
                 Avoid excess nitrogen to reduce pests.",
            ),
            (
                "Irrigation",
                "Rice requires 1000-2000mm water annually. Flooding is continuous during growth. \
                 Keep 5-7cm water depth from transplanting to panicle emergence. \
                 Reduce to 2-3cm during grain filling. Drain 2 weeks before harvest.",
            ),
        ],
    ),
    (
        "Onion",
        "Rabi",
        [
            (
                "Fertilizer",
                "Onion needs 80kg N, 40kg P2O5, 60kg K2O per hectare. \
                 Apply FYM 20 tons/ha + DAP 250kg/ha at planting. \
                 Urea 100kg/ha at 30 days, 100kg/ha at 60 days. \
                 Potassium chloride 100kg/ha for bulb development.",
            ),
            (
                "Cultivation",
                "Onion grows from sets or seeds. Plant at 15cm x 10cm spacing. Days to harvest: 90-120 days. \
                 Requires cool weather for bulbing. Harvest when tops fall over and dry. \
                 Yield: 40-50 tons/hectare. Store in a cool, dry place.",
            ),
            (
                "Pest",
                "Onion pests: thrips, stem borer. Diseases: pink root, basal rot, purple blotch. \
                 Control: spray dimethoate for thrips, copper fungicide for blotch. \
                 Avoid overhead irrigation. Ensure good drainage.",
            ),
            (
                "Irrigation",
                "Onion needs 400-600mm water in 90-120 days. Drip irrigation is best. \
                 Water weekly during growth, reduce during bulbing to concentrate sugars. \
                 Avoid waterlogging which causes rot.",
            ),
        ],
    ),
    (
        "Cotton",
        "Kharif",
        [
            (
                "Fertilizer",
                "Cotton needs 100kg N, 50kg P2O5, 50kg K2O per hectare. Apply DAP 250kg/ha at planting. \
                 Urea 100kg/ha at 45 days, 100kg/ha at 90 days. Potassium chloride 100kg/ha. \
                 FYM 5 tons/ha. Monitor for deficiencies.",
            ),
            (
                "Cultivation",
                "Cotton is a kharif crop. Sow June-July. Spacing: 90cm x 60cm. \
                 Top the plant at 90cm height to increase boll formation. Harvest September-December. \
                 Yield: 15-25 quintals/hectare of seed cotton. Requires warm climate.",
            ),
            (
                "Pest",
                "Major cotton pests: bollworm, leaf roller, aphid, spider mite. Diseases: leaf curl, wilt. \
                 Control: use Bt cotton varieties, spray neem oil, monitor with pheromone traps. \
                 Avoid excess nitrogen which promotes vegetative growth.",
            ),
            (
                "Irrigation",
                "Cotton needs 600-1000mm water. Critical stages: flowering and boll development. \
                 Drip or flood irrigation. Water every 10-12 days during growth, \
                 increase frequency during flowering. Avoid waterlogging which promotes diseases.",
            ),
        ],
    ),
    (
        "Potato",
        "Rabi",
        [
            (
                "Fertilizer",
                "Potato needs 90kg N, 60kg P2O5, 90kg K2O per hectare. \
                 Apply FYM 20 tons/ha + DAP 300kg/ha at planting. \
                 Urea 100kg/ha at 30 days, 100kg/ha at 60 days. \
                 Potassium chloride 150kg/ha for quality tubers.",
            ),
            (
                "Cultivation",
                "Potato is a rabi crop. Grow potatoes from certified seed tubers (20-25g) planted at 25cm x 10cm spacing. \
                 Hill soil to 5cm at 30-40 days for tuber development. \
                 Harvest 90-120 days after planting when leaves dry. Yield: 200-250 quintals/hectare.",
            ),
            (
                "Pest",
                "Potato pests: cut worm, aphid, mite. Diseases: late blight, early blight, scab. \
                 Control: use disease-resistant varieties, spray mancozeb for blight, avoid overhead irrigation. \
                 Rotate crops to reduce soil-borne diseases.",
            ),
            (
                "Irrigation",
                "Potato needs 400-500mm water in 90-120 days. Critical stage: tuberization (40-60 days). \
                 Drip irrigation ensures uniform growth. Avoid waterlogging which causes tuber rot. \
                 Mulching conserves moisture.",
            ),
        ],
    ),
];

/// 일반 주제 엔트리: (제목, 카테고리, 시즌, 본문)
const GENERAL: &[(&str, &str, &str, &str)] = &[
    (
        "Major Crops",
        "Crops",
        "year-round",
        "Major crops in India include rice, wheat, maize, cotton, sugarcane, pulses and a wide range of vegetables. \
         Rice is dominant in paddy regions (Kharif); wheat in rabi (winter) zones. Maize and pulses are multi-seasonal. \
         Cotton and sugarcane are important cash crops in suitable agro-climatic zones.",
    ),
    (
        "Soil Types",
        "Soil",
        "all",
        "Soil types: sandy, loamy, clayey, silt and lateritic. \
         Sandy soils drain quickly and suit groundnuts, millet, and some vegetables. \
         Loamy soils are ideal for most crops including vegetables and cereals. \
         Clay soils retain water and suit paddy. Well-drained loams suit wheat and pulses.",
    ),
    (
        "Seasonal Calendar",
        "Season",
        "Kharif/Rabi/Zaid",
        "Kharif (monsoon): rice, maize, cotton, soybean, pulses, sown in June-July. \
         Rabi (winter): wheat, mustard, chickpea, sown in October-December. \
         Zaid (summer): vegetables, cucumber, melon, short-duration crops between seasons.",
    ),
    (
        "Fertilizers",
        "Fertilizer",
        "all",
        "Chemical fertilizers include urea (N), DAP (P), MOP (K) and balanced NPK blends. \
         Organic options: FYM, vermicompost, neem cake, bone meal, seaweed extracts. \
         Split nitrogen applications are recommended; soil tests should guide exact dosages.",
    ),
    (
        "Pests and Diseases",
        "Pests",
        "all",
        "Common pests: aphids, whiteflies, fruit borers, stem borers. \
         Diseases: blight, wilt, mildew, bacterial spots. \
         Control: integrated pest management (IPM), monitoring, biological controls, targeted chemical use when needed.",
    ),
    (
        "Irrigation Methods",
        "Irrigation",
        "all",
        "Irrigation options: flood (traditional), sprinkler, drip (most water-efficient). \
         Mulching and scheduling reduce water needs. Drip suits vegetables and orchards.",
    ),
    (
        "Weather Impact",
        "Weather",
        "all",
        "Weather affects sowing dates, pest cycles and water needs. \
         Monitor seasonal forecasts and plan sowing and irrigation accordingly. \
         Extreme events such as drought, flood and heat need contingency plans.",
    ),
    (
        "Market Factors",
        "Market",
        "all",
        "Market prices depend on seasonality, quality, transport and demand. \
         Grading and direct marketing increase farmer returns. Watch local mandi prices.",
    ),
    (
        "Government Schemes",
        "Schemes",
        "all",
        "Key programs: income support, crop insurance, irrigation subsidies and credit facilities. \
         Check the local agriculture office for scheme details and eligibility.",
    ),
];

/// 예시 질문 목록
pub const SUGGESTED_QUESTIONS: &[&str] = &[
    "Which fertilizer is best for tomatoes?",
    "How do I grow cucumber?",
    "What is the best irrigation method for wheat?",
    "How can I prevent pests on rice?",
    "When should I harvest onions?",
    "What fertilizer for cotton?",
    "How to grow potatoes?",
    "When to plant wheat?",
];

/// 기본 코퍼스 생성
pub fn default_corpus() -> Vec<NewEntry> {
    let crop_entries = CROPS.iter().flat_map(|(crop, season, topics)| {
        topics.iter().map(move |(topic, text)| {
            NewEntry::new(*crop, *topic, normalize_literal(text)).with_season(*season)
        })
    });

    let general_entries = GENERAL.iter().map(|(title, category, season, text)| {
        NewEntry::new(*title, *category, normalize_literal(text)).with_season(*season)
    });

    crop_entries.chain(general_entries).collect()
}

/// 문자열 리터럴 줄바꿈 이스케이프로 생긴 연속 공백 정리
fn normalize_literal(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
